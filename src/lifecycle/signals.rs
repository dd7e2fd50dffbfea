//! OS signal handling.

use crate::lifecycle::cancel::CancelHandle;

/// Cancel `handle` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, cancelling");
                handle.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
