//! Per-sender nonce assignment.
//!
//! Nonces for one sender are handed out under that sender's lock, so
//! concurrent builds never reuse or skip a value. Different senders do not
//! contend.

use std::future::Future;
use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::chain::types::{FacadeError, FacadeResult};

/// Client-side nonce cache, seeded lazily from the node.
#[derive(Debug, Clone, Default)]
pub struct NonceManager {
    /// Next nonce to hand out per sender; `None` until seeded.
    slots: Arc<DashMap<Address, Arc<Mutex<Option<u64>>>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, sender: Address) -> Arc<Mutex<Option<u64>>> {
        self.slots.entry(sender).or_default().clone()
    }

    /// Assign the next nonce for `sender`.
    ///
    /// `fetch` is only awaited when the cache is empty and must return the
    /// node's pending nonce.
    pub async fn next<F, Fut>(&self, sender: Address, fetch: F) -> FacadeResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FacadeResult<u64>>,
    {
        let slot = self.slot(sender);
        let mut next = slot.lock().await;

        let nonce = match *next {
            Some(n) => n,
            None => {
                let seeded = fetch().await?;
                tracing::debug!(sender = %sender, nonce = seeded, "Seeded nonce from node");
                seeded
            }
        };
        let following = nonce.checked_add(1).ok_or_else(|| {
            FacadeError::Rejected(format!("nonce {} for {} cannot advance", nonce, sender))
        })?;
        *next = Some(following);
        Ok(nonce)
    }

    /// Give back a nonce whose transaction never reached the node.
    ///
    /// The newest assignment rewinds in place. Releasing an older one would
    /// leave a gap, so the cache is dropped and re-read from the node.
    pub async fn release(&self, sender: Address, nonce: u64) {
        let slot = self.slot(sender);
        let mut next = slot.lock().await;
        if *next == nonce.checked_add(1) {
            *next = Some(nonce);
        } else {
            *next = None;
        }
        tracing::debug!(sender = %sender, nonce = nonce, "Released unused nonce");
    }

    /// Forget the cached nonce so the next assignment re-reads the node.
    ///
    /// Called after a rejected submission, when the cache may be ahead of
    /// the chain.
    pub async fn reset(&self, sender: Address) {
        let slot = self.slot(sender);
        *slot.lock().await = None;
    }

    /// Cached next nonce, if seeded.
    pub async fn peek(&self, sender: Address) -> Option<u64> {
        let slot = self.slot(sender);
        let next = *slot.lock().await;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_seeds_once_then_increments() {
        let manager = NonceManager::new();
        let fetches = Arc::new(AtomicU32::new(0));
        let sender = Address::repeat_byte(1);

        for expected in 5..8 {
            let fetches = fetches.clone();
            let nonce = manager
                .next(sender, || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(5)
                })
                .await
                .unwrap();
            assert_eq!(nonce, expected);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(manager.peek(sender).await, Some(8));
    }

    #[tokio::test]
    async fn test_concurrent_assignment_is_gapless() {
        let manager = NonceManager::new();
        let sender = Address::repeat_byte(2);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .next(sender, || async {
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        Ok(100)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, (100..116).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_reset_reseeds() {
        let manager = NonceManager::new();
        let sender = Address::repeat_byte(3);

        assert_eq!(manager.next(sender, || async { Ok(1) }).await.unwrap(), 1);
        manager.reset(sender).await;
        assert_eq!(manager.peek(sender).await, None);
        assert_eq!(manager.next(sender, || async { Ok(9) }).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_release_newest_rewinds() {
        let manager = NonceManager::new();
        let sender = Address::repeat_byte(5);

        let first = manager.next(sender, || async { Ok(3) }).await.unwrap();
        manager.release(sender, first).await;
        assert_eq!(manager.peek(sender).await, Some(3));
        assert_eq!(manager.next(sender, || async { Ok(99) }).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_release_older_drops_cache() {
        let manager = NonceManager::new();
        let sender = Address::repeat_byte(6);

        let first = manager.next(sender, || async { Ok(3) }).await.unwrap();
        let _second = manager.next(sender, || async { Ok(3) }).await.unwrap();
        manager.release(sender, first).await;
        assert_eq!(manager.peek(sender).await, None);
    }

    #[tokio::test]
    async fn test_exhausted_nonce_is_an_error() {
        let manager = NonceManager::new();
        let sender = Address::repeat_byte(7);

        let result = manager.next(sender, || async { Ok(u64::MAX) }).await;
        assert!(matches!(result, Err(FacadeError::Rejected(_))));
        assert_eq!(manager.peek(sender).await, None);
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_cache_empty() {
        let manager = NonceManager::new();
        let sender = Address::repeat_byte(4);

        let result = manager
            .next(sender, || async {
                Err(FacadeError::Connection("down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(manager.peek(sender).await, None);
    }
}
