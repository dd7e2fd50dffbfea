//! Sends templated SMS and records every attempt.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SmsConfig;
use crate::observability::metrics::record_sms;
use crate::sms::audit::{AuditLog, AuditRecord};
use crate::sms::provider::{HttpSmsProvider, SmsProvider};
use crate::sms::types::{SmsCredentials, SmsError, SmsOutcome, SmsRequest};

/// Code stored in the audit record when the gateway never answered.
pub const TRANSPORT_FAILURE_CODE: &str = "TransportError";

pub struct SmsSender {
    provider: Arc<dyn SmsProvider>,
    credentials: SmsCredentials,
    audit: AuditLog,
}

impl SmsSender {
    pub fn new(provider: Arc<dyn SmsProvider>, credentials: SmsCredentials, audit: AuditLog) -> Self {
        Self {
            provider,
            credentials,
            audit,
        }
    }

    /// Sender backed by [`HttpSmsProvider`] as configured.
    pub fn from_config(config: &SmsConfig) -> Result<Self, SmsError> {
        if !config.enabled {
            return Err(SmsError::InvalidRequest("sms is disabled in config".into()));
        }
        let provider = HttpSmsProvider::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        let credentials = SmsCredentials {
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            sign_name: config.sign_name.clone(),
        };
        Ok(Self::new(
            Arc::new(provider),
            credentials,
            AuditLog::new(&config.audit_log_path),
        ))
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Send `template_code` to `phone` with `params` as template variables.
    ///
    /// Exactly one audit record is appended per call that reaches the
    /// provider, whether the send succeeds or not. A refusal is returned as
    /// [`SmsError::Provider`] after it is recorded.
    pub async fn send(
        &self,
        phone: &str,
        template_code: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<SmsOutcome, SmsError> {
        if phone.trim().is_empty() {
            return Err(SmsError::InvalidRequest("phone number is empty".into()));
        }
        if template_code.trim().is_empty() {
            return Err(SmsError::InvalidRequest("template code is empty".into()));
        }

        let request = SmsRequest {
            phone_numbers: phone.to_string(),
            template_code: template_code.to_string(),
            template_param: serde_json::to_string(params)?,
        };

        let result = self.provider.send(&request, &self.credentials).await;
        let outcome = match &result {
            Ok(outcome) => outcome.clone(),
            Err(e) => SmsOutcome {
                success: false,
                code: TRANSPORT_FAILURE_CODE.to_string(),
                message: e.to_string(),
                ..Default::default()
            },
        };

        let record = AuditRecord::new(&request, &self.credentials.sign_name, &outcome);
        if let Err(e) = self.audit.append(&record).await {
            tracing::error!(
                record_id = %record.id,
                path = %self.audit.path().display(),
                delivered = outcome.success,
                error = %e,
                "Failed to write SMS audit record"
            );
            record_sms("audit_failed");
            return Err(e);
        }

        match result {
            Ok(outcome) if outcome.success => {
                record_sms("sent");
                tracing::info!(
                    record_id = %record.id,
                    template = %template_code,
                    request_id = %outcome.request_id,
                    "SMS sent"
                );
                Ok(outcome)
            }
            Ok(outcome) => {
                record_sms("refused");
                tracing::warn!(
                    record_id = %record.id,
                    template = %template_code,
                    code = %outcome.code,
                    message = %outcome.message,
                    "SMS refused by provider"
                );
                Err(SmsError::Provider {
                    code: outcome.code,
                    message: outcome.message,
                })
            }
            Err(e) => {
                record_sms("transport_error");
                tracing::warn!(record_id = %record.id, error = %e, "SMS gateway unreachable");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SmsSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsSender")
            .field("credentials", &self.credentials)
            .field("audit", &self.audit.path())
            .finish_non_exhaustive()
    }
}
