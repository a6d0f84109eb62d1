use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

use crate::external::aggregator::AggregatorError;
use crate::external::exchange::ExchangeError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    #[error("Aggregator error: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The purchase settled but the invested-ids bookkeeping could not be
    /// committed. Money has moved; the ledger has not. Reconciliation is
    /// required before the affected ids are evaluated again.
    #[error("Order {order_id} settled but bookkeeping failed: {source}")]
    Reconciliation {
        order_id: String,
        #[source]
        source: StoreError,
    },
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            AppError::Aggregator(AggregatorError::RateLimited)
            | AppError::Exchange(ExchangeError::RateLimited) => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from_static("60"));
                (StatusCode::TOO_MANY_REQUESTS, headers, "Rate limited").into_response()
            }
            AppError::Exchange(ExchangeError::BelowMinimum { .. }) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            AppError::Aggregator(err) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
            AppError::Exchange(err) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
            AppError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Reconciliation { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
        }
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}
