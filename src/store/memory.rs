use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::UserInvestmentState;
use crate::store::{StateStore, StoreError, VersionedState};

/// In-memory state store. Stands in for the external key-value collaborator;
/// the DashMap entry lock makes each compare-and-swap atomic.
#[derive(Default)]
pub struct InMemoryStateStore {
    records: DashMap<Uuid, VersionedState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<VersionedState>, StoreError> {
        Ok(self.records.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        user_id: Uuid,
        expected_version: Option<u64>,
        state: UserInvestmentState,
    ) -> Result<VersionedState, StoreError> {
        match self.records.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if expected_version != Some(entry.get().version) {
                    return Err(StoreError::VersionConflict(user_id));
                }
                let next = VersionedState {
                    version: entry.get().version + 1,
                    state,
                };
                entry.insert(next.clone());
                Ok(next)
            }
            Entry::Vacant(entry) => {
                if expected_version.is_some() {
                    return Err(StoreError::VersionConflict(user_id));
                }
                let next = VersionedState { version: 1, state };
                entry.insert(next.clone());
                Ok(next)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_state(user_id: Uuid) -> UserInvestmentState {
        UserInvestmentState::default_for_user(user_id)
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = InMemoryStateStore::new();
        let user_id = Uuid::new_v4();

        assert!(store.load(user_id).await.unwrap().is_none());

        let created = store
            .compare_and_swap(user_id, None, new_state(user_id))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let loaded = store.load(user_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.state.user_id, user_id);
    }

    #[tokio::test]
    async fn test_create_fails_if_record_exists() {
        let store = InMemoryStateStore::new();
        let user_id = Uuid::new_v4();

        store
            .compare_and_swap(user_id, None, new_state(user_id))
            .await
            .unwrap();

        let result = store
            .compare_and_swap(user_id, None, new_state(user_id))
            .await;
        assert!(matches!(result, Err(StoreError::VersionConflict(_))));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = InMemoryStateStore::new();
        let user_id = Uuid::new_v4();

        let v1 = store
            .compare_and_swap(user_id, None, new_state(user_id))
            .await
            .unwrap();

        let mut updated = v1.state.clone();
        updated.exchange_linked = true;
        let v2 = store
            .compare_and_swap(user_id, Some(v1.version), updated)
            .await
            .unwrap();
        assert_eq!(v2.version, 2);

        // A writer still holding version 1 must lose.
        let stale = store
            .compare_and_swap(user_id, Some(v1.version), v1.state.clone())
            .await;
        assert!(matches!(stale, Err(StoreError::VersionConflict(_))));

        let current = store.load(user_id).await.unwrap().unwrap();
        assert!(current.state.exchange_linked);
    }
}
