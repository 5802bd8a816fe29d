//! Per-user serialisation of read-modify-write cycles.
//!
//! Every mutation of one user's progression (choice, evaluation, view) runs
//! under that user's async mutex. Different users never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::UserId;

/// Table of per-user async mutexes.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user`'s progression.
    pub async fn lock(&self, user: UserId) -> OwnedMutexGuard<()> {
        // Clone the handle out so the shard guard is released before awaiting.
        let handle = Arc::clone(self.locks.entry(user).or_default().value());
        handle.lock_owned().await
    }

    /// Drop entries nobody holds or waits on. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, handle| Arc::strong_count(handle) > 1);
        before - self.locks.len()
    }

    /// Number of users with a lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
