//! Reconciliation lock.
//!
//! At most one trigger (administrator command, nightly job, startup sync)
//! may be mutating remote state at a time. The lock is a real mutex owned by
//! the reconciler, acquired with queued semantics: a second caller parks on
//! `acquire` instead of polling a shared flag, so two callers can never both
//! observe "free" and proceed.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Process-wide mutual exclusion between reconciliation runs.
#[derive(Clone, Default)]
pub struct SyncLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one reconciliation run; releasing is dropping.
pub struct SyncGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SyncLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock, waiting in FIFO order behind any running
    /// reconciliation.
    pub async fn acquire(&self) -> SyncGuard {
        SyncGuard {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    /// Acquires the lock only if no reconciliation is running.
    #[must_use]
    pub fn try_acquire(&self) -> Option<SyncGuard> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .ok()
            .map(|guard| SyncGuard { _guard: guard })
    }

    /// Whether a reconciliation currently holds the lock. Advisory only;
    /// use [`SyncLock::acquire`] to actually serialize.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn lock_is_observable_while_held() {
        let lock = SyncLock::new();
        assert!(!lock.is_held());

        let guard = lock.acquire().await;
        assert!(lock.is_held());
        assert!(lock.try_acquire().is_none());

        drop(guard);
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn waiters_defer_until_release() {
        let lock = SyncLock::new();
        let guard = lock.acquire().await;

        let contender = {
            let lock = lock.clone();
            tokio::spawn(async move {
                let _guard = lock.acquire().await;
            })
        };

        // The contender cannot get through while the lock is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);

        // Release wakes the waiter well within the one-second bound.
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("waiter should wake after release")
            .unwrap();
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn two_contenders_serialize() {
        let lock = SyncLock::new();
        let counter = Arc::new(std::sync::Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let lock = lock.clone();
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = lock.acquire().await;
                let mut value = counter.lock().unwrap();
                *value += 1;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 2);
    }
}
