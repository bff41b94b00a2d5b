//! Per-path async locks serializing file change handling.
//!
//! Changes touching the same path run one after another, so a Modify cannot
//! be overtaken by a stale Delete. Several paths are always locked in sorted
//! order, which rules out lock-order deadlocks between two renames.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

#[derive(Default)]
pub struct PathLocks {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

/// Holds the locks of one change. Dropping it releases them and forgets
/// slots nobody else waits on.
pub struct PathGuard {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, paths: &[&str]) -> PathGuard {
        let mut ordered: Vec<&str> = paths.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut held = Vec::with_capacity(ordered.len());
        for path in ordered {
            let slot = {
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(slots.entry(path.to_string()).or_default())
            };
            held.push((path.to_string(), slot.lock_owned().await));
        }

        PathGuard {
            slots: Arc::clone(&self.slots),
            held,
        }
    }

    /// Number of paths with a live slot.
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        let held = std::mem::take(&mut self.held);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for (path, guard) in held {
            drop(guard);
            // Only the map still references the slot: no holder, no waiter
            let idle = slots
                .get(&path)
                .map_or(false, |slot| Arc::strong_count(slot) == 1);
            if idle {
                slots.remove(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_is_serialized() {
        let locks = Arc::new(PathLocks::new());
        let first = locks.lock(&["a.md"]).await;

        let released = Arc::new(AtomicBool::new(false));
        let waiter = {
            let locks = locks.clone();
            let released = released.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&["a.md"]).await;
                assert!(released.load(Ordering::SeqCst));
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        released.store(true, Ordering::SeqCst);
        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.lock(&["a.md"]).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&["b.md"])).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_rename_locks_both_paths_once() {
        let locks = PathLocks::new();
        let guard = locks.lock(&["new.md", "old.md", "new.md"]).await;
        assert_eq!(locks.tracked(), 2);

        drop(guard);
        assert_eq!(locks.tracked(), 0);
    }
}
