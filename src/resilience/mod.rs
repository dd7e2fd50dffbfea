//! Resilience helpers.
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every wait has a deadline
//! - No automatic retries: callers decide whether to resubmit
//! - Polling backs off with jitter instead of sleeping a fixed interval

pub mod backoff;
pub mod timeouts;
