//! Process-local set of webhook ids with a delivery in progress.
//!
//! Only guards against double sends within one process. Several backend
//! instances polling the same queue can still deliver an entry twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InFlightLocks {
    held: Mutex<HashSet<Uuid>>,
}

impl InFlightLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking. Returns `false` when the id is already held.
    pub fn try_acquire(&self, webhook_id: Uuid) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(webhook_id)
    }

    pub fn release(&self, webhook_id: Uuid) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&webhook_id);
    }

    pub fn is_held(&self, webhook_id: Uuid) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&webhook_id)
    }

    /// Acquire `webhook_id` and release it when the guard drops.
    pub fn try_lock(self: &Arc<Self>, webhook_id: Uuid) -> Option<InFlightGuard> {
        self.try_acquire(webhook_id).then(|| InFlightGuard {
            locks: Arc::clone(self),
            webhook_id,
        })
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    locks: Arc<InFlightLocks>,
    webhook_id: Uuid,
}

impl InFlightGuard {
    pub fn webhook_id(&self) -> Uuid {
        self.webhook_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.locks.release(self.webhook_id);
    }
}
