use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::BankTransaction;

/// Credential handed back by the aggregator once a user completes the link
/// flow. Stored on the user record and replayed on every transactions fetch.
#[derive(Debug, Clone)]
pub struct AggregatorCredential {
    pub access_token: String,
    pub item_id: String,
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("aggregator is not configured: {0}")]
    NotConfigured(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

/// Banking-data aggregator collaborator: link-flow tokens plus transaction
/// history for a stored credential.
#[async_trait]
pub trait TransactionAggregator: Send + Sync {
    /// Create a short-lived token the client uses to open the link UI.
    async fn create_link_token(&self, user_id: Uuid) -> Result<String, AggregatorError>;

    /// Swap the public token produced by the link UI for a durable credential.
    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<AggregatorCredential, AggregatorError>;

    /// Fetch transactions between `start_date` and `end_date` inclusive.
    /// Amounts come back as absolute values with two fraction digits.
    async fn fetch_transactions(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<BankTransaction>, AggregatorError>;
}
