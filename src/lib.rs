//! Minimal EVM client facade with an SMS notification side channel.

pub mod chain;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sms;

pub use chain::{Facade, FacadeError, FacadeResult, Wallet};
pub use config::FacadeConfig;
pub use lifecycle::{CancelHandle, CancelToken};
