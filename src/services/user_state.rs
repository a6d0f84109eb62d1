use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::external::aggregator::AggregatorCredential;
use crate::models::{UpdatePreferences, UserInvestmentState};
use crate::state::AppState;
use crate::store::{StateStore, StoreError, VersionedState};

/// Load a user's investment state, creating the default record on first
/// access. Loses gracefully if another instance creates it first.
pub async fn load_or_create(
    store: &dyn StateStore,
    user_id: Uuid,
) -> Result<VersionedState, AppError> {
    if let Some(versioned) = store.load(user_id).await? {
        return Ok(versioned);
    }

    info!("No investment state for user {}, creating defaults", user_id);
    match store
        .compare_and_swap(user_id, None, UserInvestmentState::default_for_user(user_id))
        .await
    {
        Ok(versioned) => Ok(versioned),
        Err(StoreError::VersionConflict(_)) => {
            store.load(user_id).await?.ok_or(AppError::NotFound)
        }
        Err(err) => Err(err.into()),
    }
}

/// Current state for display.
pub async fn get_state(app: &AppState, user_id: Uuid) -> Result<UserInvestmentState, AppError> {
    Ok(load_or_create(app.store.as_ref(), user_id).await?.state)
}

/// Validate and persist a preference update under the user's lock.
pub async fn save_preferences(
    app: &AppState,
    user_id: Uuid,
    update: UpdatePreferences,
) -> Result<UserInvestmentState, AppError> {
    let _guard = app.user_locks.acquire(user_id).await;

    info!("Updating preferences for user {}", user_id);
    let versioned = load_or_create(app.store.as_ref(), user_id).await?;

    let mut record = versioned.state;
    update.apply_to(&mut record).map_err(AppError::Validation)?;

    let committed = app
        .store
        .compare_and_swap(user_id, Some(versioned.version), record)
        .await?;
    Ok(committed.state)
}

/// Mark the exchange account as linked for this user. Does not call the
/// exchange; credentials live in the environment, not on the user record.
pub async fn link_exchange_account(
    app: &AppState,
    user_id: Uuid,
) -> Result<UserInvestmentState, AppError> {
    let _guard = app.user_locks.acquire(user_id).await;

    info!("Linking exchange account for user {}", user_id);
    let versioned = load_or_create(app.store.as_ref(), user_id).await?;

    let mut record = versioned.state;
    record.exchange_linked = true;
    record.updated_at = chrono::Utc::now();

    let committed = app
        .store
        .compare_and_swap(user_id, Some(versioned.version), record)
        .await?;
    Ok(committed.state)
}

/// Persist the durable aggregator credential returned by the link flow.
pub async fn store_aggregator_credential(
    app: &AppState,
    user_id: Uuid,
    credential: AggregatorCredential,
) -> Result<UserInvestmentState, AppError> {
    let _guard = app.user_locks.acquire(user_id).await;

    info!(
        "Storing aggregator credential for user {} (item {})",
        user_id, credential.item_id
    );
    let versioned = load_or_create(app.store.as_ref(), user_id).await?;

    let mut record = versioned.state;
    record.aggregator_credential = Some(credential.access_token);
    record.updated_at = chrono::Utc::now();

    let committed = app
        .store
        .compare_and_swap(user_id, Some(versioned.version), record)
        .await?;
    Ok(committed.state)
}
