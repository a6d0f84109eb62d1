use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of per-user async locks.
///
/// Holding a user's lock for the whole of an evaluation is what guarantees
/// at most one in-flight auto-invest per user; preference writes take the
/// same lock so the two writers cannot interleave their read-modify-write
/// cycles. Lock entries are never removed: the set of active users in one
/// process is small and a stale entry is just an idle mutex.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
