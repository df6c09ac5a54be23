use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries kept around before idle locks are pruned
const PRUNE_THRESHOLD: usize = 256;

/// One async lock per plate, created on demand.
///
/// Sightings of the same plate queue behind each other; different plates never
/// share a lock.
#[derive(Default)]
pub struct PlateLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PlateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `plate`
    pub async fn acquire(&self, plate: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds a reference to an idle lock
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            locks
                .entry(plate.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_plate_is_exclusive() {
        let locks = Arc::new(PlateLocks::new());
        let guard = locks.acquire("ABC123").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("ABC123").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire the lock")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_plates_do_not_contend() {
        let locks = PlateLocks::new();
        let _first = locks.acquire("ABC123").await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("XYZ789")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = PlateLocks::new();
        for i in 0..PRUNE_THRESHOLD + 10 {
            let _guard = locks.acquire(&format!("P{}", i)).await;
        }
        assert!(locks.len() <= PRUNE_THRESHOLD);
    }
}
