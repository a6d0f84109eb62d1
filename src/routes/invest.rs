use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::InvestOutcome;
use crate::services::auto_invest;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/invest", post(trigger_invest))
        .route("/users/:user_id/invest/direct", post(direct_invest))
        .route("/users/:user_id/roundups", get(get_roundups))
}

/// POST /api/users/:user_id/invest
/// Evaluate accumulated round-ups and invest them if the threshold is met.
/// Safe to call on a schedule or from a dashboard poll.
pub async fn trigger_invest(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    info!("POST /api/users/{}/invest", user_id);

    let outcome = auto_invest::evaluate_and_invest(&state, user_id).await?;

    let payload = match outcome {
        InvestOutcome::NotLinked => json!({
            "outcome": "not_linked",
            "message": "Exchange account is not linked",
        }),
        InvestOutcome::BelowThreshold {
            current_total,
            threshold,
        } => json!({
            "outcome": "below_threshold",
            "message": "Roundup total does not meet the threshold yet",
            "current_total": current_total.to_f64().unwrap_or(0.0),
            "threshold": threshold.to_f64().unwrap_or(0.0),
        }),
        InvestOutcome::Invested {
            amount,
            asset,
            order_id,
            order_status,
            contributing_ids,
            date,
        } => json!({
            "outcome": "invested",
            "message": format!("Successfully invested {:.2} in {}", amount.to_f64().unwrap_or(0.0), asset),
            "amount": amount.to_f64().unwrap_or(0.0),
            "asset": asset,
            "order_id": order_id,
            "order_status": order_status,
            "transaction_count": contributing_ids.len(),
            "date": date,
        }),
    };

    Ok((StatusCode::OK, Json(payload)))
}

#[derive(Debug, Deserialize)]
pub struct DirectInvestRequest {
    pub amount: f64,
    pub asset: Option<String>,
}

/// POST /api/users/:user_id/invest/direct
/// Invest a fixed amount immediately, independent of round-ups.
pub async fn direct_invest(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<DirectInvestRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!("POST /api/users/{}/invest/direct", user_id);

    let receipt =
        auto_invest::direct_invest(&state, user_id, request.amount, request.asset).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "amount": receipt.amount.to_f64().unwrap_or(0.0),
            "asset": receipt.asset,
            "deposit_id": receipt.deposit_id,
            "order_id": receipt.order_id,
            "order_status": receipt.order_status,
            "date": receipt.date,
        })),
    ))
}

/// GET /api/users/:user_id/roundups
/// The uninvested round-up total a subsequent invest call would act on.
pub async fn get_roundups(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    info!("GET /api/users/{}/roundups", user_id);

    let (uninvested, record) = auto_invest::get_uninvested_total(&state, user_id).await?;
    let total = uninvested.total.to_f64().unwrap_or(0.0);
    let threshold = record.threshold.to_f64().unwrap_or(0.0);

    Ok((
        StatusCode::OK,
        Json(json!({
            "total": total,
            "threshold": threshold,
            "threshold_met": uninvested.total >= record.threshold,
            "uninvested_transaction_count": uninvested.contributing_ids.len(),
        })),
    ))
}
