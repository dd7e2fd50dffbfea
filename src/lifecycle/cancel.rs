//! Caller-driven cancellation.

use tokio::sync::watch;

/// Owner side of a cancellation signal.
///
/// Unlike a broadcast channel, the signal is level-triggered: tokens created
/// or polled after `cancel()` observe it too.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a token that waiters can select on.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Trigger the cancellation signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiter side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the handle cancels.
    ///
    /// If every handle is dropped without cancelling, this never resolves.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
            if !closed {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}
