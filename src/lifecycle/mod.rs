//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Caller holds CancelHandle
//!     → hands CancelToken to await_receipt / subscribe_logs
//!     → cancel() or Ctrl-C (signals.rs) wakes every waiting token
//! ```

pub mod cancel;
pub mod signals;

pub use cancel::{CancelHandle, CancelToken};
