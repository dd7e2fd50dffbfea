//! SMS request, outcome, and error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider code that marks a successful send.
pub const SUCCESS_CODE: &str = "OK";

/// Errors from the SMS subsystem.
#[derive(Debug, Error)]
pub enum SmsError {
    /// Gateway unreachable, timed out, or answered with an unparseable body.
    #[error("sms transport error: {0}")]
    Transport(String),

    /// Gateway answered but refused the message.
    #[error("sms provider refused ({code}): {message}")]
    Provider { code: String, message: String },

    /// The audit record could not be written.
    #[error("sms audit write failed: {0}")]
    Audit(#[from] std::io::Error),

    /// Template parameters could not be serialized.
    #[error("sms parameter encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid sms request: {0}")]
    InvalidRequest(String),
}

/// One templated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRequest {
    /// Comma-separated destination numbers.
    pub phone_numbers: String,
    pub template_code: String,
    /// Template variables as a JSON object string.
    pub template_param: String,
}

/// Account credentials and registered signature.
#[derive(Clone)]
pub struct SmsCredentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub sign_name: String,
}

impl std::fmt::Debug for SmsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("sign_name", &self.sign_name)
            .finish()
    }
}

/// What the provider answered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmsOutcome {
    pub success: bool,
    pub request_id: String,
    pub biz_id: String,
    pub code: String,
    pub message: String,
}

impl SmsOutcome {
    pub fn from_response(request_id: String, biz_id: String, code: String, message: String) -> Self {
        Self {
            success: code == SUCCESS_CODE,
            request_id,
            biz_id,
            code,
            message,
        }
    }
}
