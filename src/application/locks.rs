use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::UserId;

const PRUNE_THRESHOLD: usize = 1024;

/// Lazily created per-user mutexes.
///
/// Holding the guard serialises every read-modify-write for one user inside
/// this process. Entries are weak, so idle users cost nothing once pruned.
#[derive(Default)]
pub struct UserLocks {
    slots: Mutex<HashMap<UserId, Weak<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: UserId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            match slots.get(&id).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    if slots.len() >= PRUNE_THRESHOLD {
                        slots.retain(|_, weak| weak.strong_count() > 0);
                    }
                    let slot = Arc::new(AsyncMutex::new(()));
                    slots.insert(id, Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    /// Number of users with a live lock.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
