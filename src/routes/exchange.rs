use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::ToPrimitive;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::InvestmentStateResponse;
use crate::services::user_state;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/exchange/link", post(link_exchange))
        .route("/exchange/balances", get(held_balances))
}

/// POST /api/users/:user_id/exchange/link
/// Mark the exchange account as linked for this user. The exchange itself
/// is not called; trading credentials come from the environment.
pub async fn link_exchange(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    info!("POST /api/users/{}/exchange/link", user_id);

    let record = user_state::link_exchange_account(&state, user_id).await?;

    Ok((StatusCode::OK, Json(InvestmentStateResponse::from(record))))
}

/// GET /api/exchange/balances
/// Non-zero crypto balances held in the exchange account.
pub async fn held_balances(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    info!("GET /api/exchange/balances");

    let balances = state.exchange.held_balances().await?;

    let payload: Vec<serde_json::Value> = balances
        .iter()
        .map(|balance| {
            json!({
                "asset": balance.asset,
                "amount": balance.amount.to_f64().unwrap_or(0.0),
            })
        })
        .collect();

    Ok((StatusCode::OK, Json(json!({ "balances": payload }))))
}
