//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Facade, connection and SMS sender produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Key material and SMS credentials are never logged
//! - RUST_LOG overrides the configured level

pub mod logging;
pub mod metrics;
