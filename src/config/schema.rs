//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every section has defaults so a minimal file only names what differs.

use serde::{Deserialize, Serialize};

/// Root configuration for the facade and its CLI.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FacadeConfig {
    /// Node connection settings.
    pub chain: ChainConfig,

    /// Receipt polling settings.
    pub receipts: ReceiptConfig,

    /// SMS notification settings.
    pub sms: SmsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Chain connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// WebSocket endpoint used for log subscriptions.
    pub ws_url: Option<String>,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            ws_url: None,
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
        }
    }
}

/// Receipt polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReceiptConfig {
    /// First poll interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Ceiling for the backed-off poll interval in milliseconds.
    pub max_poll_interval_ms: u64,

    /// Give up waiting after this many seconds.
    pub timeout_secs: u64,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_poll_interval_ms: 8000,
            timeout_secs: 120,
        }
    }
}

/// SMS gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Enable SMS sending.
    pub enabled: bool,

    /// Gateway endpoint accepting `SendSms` requests.
    pub endpoint: String,

    pub access_key_id: String,

    pub access_key_secret: String,

    /// Signature name registered with the provider.
    pub sign_name: String,

    /// Append-only JSON-lines audit file.
    pub audit_log_path: String,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://dysmsapi.aliyuncs.com".to_string(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            sign_name: String::new(),
            audit_log_path: "sms_audit.jsonl".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
