//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: FacadeConfig → Result<(), Vec<ValidationError>>

use crate::config::schema::FacadeConfig;

/// One semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_url(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
    schemes: &[&str],
) {
    match url::Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}' (expected one of {:?})", url.scheme(), schemes),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e))),
    }
}

/// Check value ranges and cross-field constraints.
pub fn validate_config(config: &FacadeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let chain = &config.chain;
    check_url(&mut errors, "chain.rpc_url", &chain.rpc_url, &["http", "https"]);
    for url in &chain.failover_urls {
        check_url(&mut errors, "chain.failover_urls", url, &["http", "https"]);
    }
    if let Some(ws) = &chain.ws_url {
        check_url(&mut errors, "chain.ws_url", ws, &["ws", "wss"]);
    }
    if chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be greater than 0"));
    }

    let receipts = &config.receipts;
    if receipts.poll_interval_ms == 0 {
        errors.push(ValidationError::new("receipts.poll_interval_ms", "must be greater than 0"));
    }
    if receipts.max_poll_interval_ms < receipts.poll_interval_ms {
        errors.push(ValidationError::new(
            "receipts.max_poll_interval_ms",
            "must not be smaller than poll_interval_ms",
        ));
    }
    if receipts.timeout_secs == 0 {
        errors.push(ValidationError::new("receipts.timeout_secs", "must be greater than 0"));
    }

    let sms = &config.sms;
    if sms.enabled {
        check_url(&mut errors, "sms.endpoint", &sms.endpoint, &["http", "https"]);
        if sms.access_key_id.is_empty() {
            errors.push(ValidationError::new("sms.access_key_id", "required when sms is enabled"));
        }
        if sms.access_key_secret.is_empty() {
            errors.push(ValidationError::new("sms.access_key_secret", "required when sms is enabled"));
        }
        if sms.sign_name.is_empty() {
            errors.push(ValidationError::new("sms.sign_name", "required when sms is enabled"));
        }
        if sms.audit_log_path.is_empty() {
            errors.push(ValidationError::new("sms.audit_log_path", "required when sms is enabled"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address like 127.0.0.1:9090",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
