use std::fmt;

use archivist_model::ImageId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::{Duration, Instant, sleep};

use crate::error::{ArchiveError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Per-record mutual exclusion for reconcile and disk deletes.
///
/// Only the engine hands out guards; callers never see the map.
#[derive(Default)]
pub struct LockSet {
    held: DashMap<ImageId, Instant>,
}

impl fmt::Debug for LockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockSet")
            .field("held", &self.held.len())
            .finish()
    }
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self, id: &ImageId) -> Option<LockGuard<'_>> {
        match self.held.entry(id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(LockGuard {
                    set: self,
                    id: id.clone(),
                })
            }
        }
    }

    /// Take the lock for `id`, waiting at most `wait` for a current holder.
    pub async fn acquire(&self, id: &ImageId, wait: Duration) -> Result<LockGuard<'_>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(guard) = self.try_acquire(id) {
                return Ok(guard);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ArchiveError::LockTimeout(id.clone()));
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    pub fn is_locked(&self, id: &ImageId) -> bool {
        self.held.contains_key(id)
    }
}

/// Releases the record lock on drop.
pub struct LockGuard<'a> {
    set: &'a LockSet,
    id: ImageId,
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("id", &self.id).finish()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.set.held.remove(&self.id);
    }
}
