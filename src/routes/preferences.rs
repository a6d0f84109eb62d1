use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{InvestmentStateResponse, UpdatePreferences};
use crate::services::user_state;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/preferences", get(get_preferences))
        .route("/users/:user_id/preferences", put(update_preferences))
}

/// GET /api/users/:user_id/preferences
/// Current investment preferences and last-investment summary.
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    info!("GET /api/users/{}/preferences", user_id);

    let record = user_state::get_state(&state, user_id).await?;

    Ok((StatusCode::OK, Json(InvestmentStateResponse::from(record))))
}

/// PUT /api/users/:user_id/preferences
/// Update threshold, asset and sweep frequency.
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(update): Json<UpdatePreferences>,
) -> Result<impl IntoResponse, AppError> {
    info!("PUT /api/users/{}/preferences", user_id);

    let record = user_state::save_preferences(&state, user_id, update).await?;

    Ok((StatusCode::OK, Json(InvestmentStateResponse::from(record))))
}
