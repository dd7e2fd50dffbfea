//! SMS provider interface and HTTP gateway implementation.

use std::time::Duration;

use serde::Deserialize;

use crate::sms::types::{SmsCredentials, SmsError, SmsOutcome, SmsRequest};

/// Anything that can deliver a templated SMS.
#[async_trait::async_trait]
pub trait SmsProvider: Send + Sync + 'static {
    /// `Ok` whenever the provider answered, including refusals; check
    /// [`SmsOutcome::success`].
    async fn send(
        &self,
        request: &SmsRequest,
        credentials: &SmsCredentials,
    ) -> Result<SmsOutcome, SmsError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendSmsResponse {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    biz_id: String,
    code: String,
    #[serde(default)]
    message: String,
}

/// Posts Aliyun-style `SendSms` forms to a gateway endpoint.
///
/// The gateway authenticates the caller with the access key secret sent as
/// a bearer token and performs the provider's request signing itself.
#[derive(Debug, Clone)]
pub struct HttpSmsProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSmsProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmsError::Transport(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl SmsProvider for HttpSmsProvider {
    async fn send(
        &self,
        request: &SmsRequest,
        credentials: &SmsCredentials,
    ) -> Result<SmsOutcome, SmsError> {
        let form = [
            ("Action", "SendSms"),
            ("Version", "2017-05-25"),
            ("Format", "JSON"),
            ("AccessKeyId", credentials.access_key_id.as_str()),
            ("PhoneNumbers", request.phone_numbers.as_str()),
            ("SignName", credentials.sign_name.as_str()),
            ("TemplateCode", request.template_code.as_str()),
            ("TemplateParam", request.template_param.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&credentials.access_key_secret)
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::Transport(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SmsError::Transport(format!("failed to read response: {}", e)))?;

        // Refusals come back as non-2xx with the same JSON shape.
        let parsed: SendSmsResponse = serde_json::from_str(&body).map_err(|e| {
            SmsError::Transport(format!(
                "unexpected gateway response (HTTP {}): {}",
                status.as_u16(),
                e
            ))
        })?;

        tracing::debug!(
            status = status.as_u16(),
            code = %parsed.code,
            request_id = %parsed.request_id,
            "SMS gateway answered"
        );

        Ok(SmsOutcome::from_response(
            parsed.request_id,
            parsed.biz_id,
            parsed.code,
            parsed.message,
        ))
    }
}
