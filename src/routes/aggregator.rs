use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::InvestmentStateResponse;
use crate::services::{auto_invest, user_state};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/aggregator/link-token",
            post(create_link_token),
        )
        .route(
            "/users/:user_id/aggregator/exchange-token",
            post(exchange_public_token),
        )
        .route("/users/:user_id/transactions", get(list_transactions))
}

/// POST /api/users/:user_id/aggregator/link-token
/// Short-lived token for the client-side bank link flow.
pub async fn create_link_token(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    info!("POST /api/users/{}/aggregator/link-token", user_id);

    let link_token = state.aggregator.create_link_token(user_id).await?;

    Ok((StatusCode::OK, Json(json!({ "link_token": link_token }))))
}

#[derive(Debug, Deserialize)]
pub struct ExchangeTokenRequest {
    pub public_token: String,
}

/// POST /api/users/:user_id/aggregator/exchange-token
/// Swap the public token from the link flow for a durable credential and
/// store it on the user record.
pub async fn exchange_public_token(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ExchangeTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("POST /api/users/{}/aggregator/exchange-token", user_id);

    let credential = state
        .aggregator
        .exchange_public_token(&request.public_token)
        .await?;
    let record = user_state::store_aggregator_credential(&state, user_id, credential).await?;

    Ok((StatusCode::OK, Json(InvestmentStateResponse::from(record))))
}

/// GET /api/users/:user_id/transactions
/// Trailing-window transactions annotated with their round-ups.
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    info!("GET /api/users/{}/transactions", user_id);

    let transactions = auto_invest::list_recent_transactions(&state, user_id).await?;

    Ok((StatusCode::OK, Json(json!({ "transactions": transactions }))))
}
