//! SMS notification subsystem.
//!
//! # Data Flow
//! ```text
//! SmsSender::send(phone, template, params)
//!     → provider.rs (SmsProvider, HTTP gateway speaking SendSms)
//!     → audit.rs (one JSON line per attempt, success or failure)
//! ```
//!
//! # Security Constraints
//! - The access key secret is never logged or written to the audit file

pub mod audit;
pub mod provider;
pub mod sender;
pub mod types;

pub use audit::{AuditLog, AuditRecord};
pub use provider::{HttpSmsProvider, SmsProvider};
pub use sender::SmsSender;
pub use types::{SmsCredentials, SmsError, SmsOutcome, SmsRequest};
