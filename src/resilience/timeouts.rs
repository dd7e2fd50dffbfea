//! Deadline enforcement.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::chain::types::{FacadeError, FacadeResult};

/// Run `fut` but fail with [`FacadeError::Timeout`] once `limit` elapses.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> FacadeResult<T>
where
    F: Future<Output = FacadeResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(FacadeError::Timeout(limit)),
    }
}

/// Remaining time until `deadline`, zero once it has passed.
pub fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
