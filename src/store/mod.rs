pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::UserInvestmentState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state for user {0} was modified concurrently")]
    VersionConflict(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A user record together with the version the store handed out for it.
#[derive(Debug, Clone)]
pub struct VersionedState {
    pub version: u64,
    pub state: UserInvestmentState,
}

/// Key-value persistence for per-user investment state, with optimistic
/// concurrency: writes name the version they read, and lose with
/// `VersionConflict` if someone else committed in between. The
/// investment-completion write and the preference write both go through
/// this interface, so neither can silently clobber the other.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<Option<VersionedState>, StoreError>;

    /// Write `state` if the stored version still matches `expected_version`.
    /// `None` means "create": it fails if a record already exists.
    async fn compare_and_swap(
        &self,
        user_id: Uuid,
        expected_version: Option<u64>,
        state: UserInvestmentState,
    ) -> Result<VersionedState, StoreError>;
}
