use async_trait::async_trait;
use bigdecimal::{BigDecimal, FromPrimitive};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::external::aggregator::{AggregatorCredential, AggregatorError, TransactionAggregator};
use crate::models::BankTransaction;

/// Plaid client for the link flow and transaction history.
pub struct PlaidAggregator {
    client: reqwest::Client,
    client_id: String,
    secret: String,
    base_url: String,
}

impl PlaidAggregator {
    pub fn from_env() -> Result<Self, AggregatorError> {
        let client_id = std::env::var("PLAID_CLIENT_ID")
            .map_err(|_| AggregatorError::NotConfigured("PLAID_CLIENT_ID not set".into()))?;
        let secret = std::env::var("PLAID_SECRET")
            .map_err(|_| AggregatorError::NotConfigured("PLAID_SECRET not set".into()))?;

        let environment =
            std::env::var("PLAID_ENV").unwrap_or_else(|_| "sandbox".to_string());
        let base_url = match environment.as_str() {
            "sandbox" => "https://sandbox.plaid.com".to_string(),
            "development" => "https://development.plaid.com".to_string(),
            "production" => "https://production.plaid.com".to_string(),
            other => {
                return Err(AggregatorError::NotConfigured(format!(
                    "PLAID_ENV must be sandbox, development or production, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            client: reqwest::Client::new(),
            client_id,
            secret,
            base_url,
        })
    }

    async fn post(
        &self,
        endpoint: &str,
        mut body: serde_json::Value,
    ) -> Result<reqwest::Response, AggregatorError> {
        body["client_id"] = json!(self.client_id);
        body["secret"] = json!(self.secret);

        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| AggregatorError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AggregatorError::RateLimited);
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp
                .json::<PlaidErrorBody>()
                .await
                .map_err(|e| AggregatorError::Parse(e.to_string()))?;
            return Err(AggregatorError::BadResponse(format!(
                "HTTP {}: {}: {}",
                status, error.error_code, error.error_message
            )));
        }

        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
struct PlaidErrorBody {
    error_code: String,
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct LinkTokenResponse {
    link_token: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeTokenResponse {
    access_token: String,
    item_id: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<PlaidTransaction>,
}

#[derive(Debug, Deserialize)]
struct PlaidTransaction {
    transaction_id: String,
    date: NaiveDate,
    name: String,
    // Plaid reports outflows positive and inflows negative.
    amount: f64,
}

#[async_trait]
impl TransactionAggregator for PlaidAggregator {
    async fn create_link_token(&self, user_id: Uuid) -> Result<String, AggregatorError> {
        let body = json!({
            "client_name": "Roundly",
            "user": { "client_user_id": user_id.to_string() },
            "products": ["transactions"],
            "country_codes": ["US"],
            "language": "en",
        });

        let resp = self.post("link/token/create", body).await?;
        let parsed = resp
            .json::<LinkTokenResponse>()
            .await
            .map_err(|e| AggregatorError::Parse(e.to_string()))?;

        Ok(parsed.link_token)
    }

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<AggregatorCredential, AggregatorError> {
        let body = json!({ "public_token": public_token });

        let resp = self.post("item/public_token/exchange", body).await?;
        let parsed = resp
            .json::<ExchangeTokenResponse>()
            .await
            .map_err(|e| AggregatorError::Parse(e.to_string()))?;

        Ok(AggregatorCredential {
            access_token: parsed.access_token,
            item_id: parsed.item_id,
        })
    }

    async fn fetch_transactions(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<BankTransaction>, AggregatorError> {
        let body = json!({
            "access_token": access_token,
            "start_date": start_date.format("%Y-%m-%d").to_string(),
            "end_date": end_date.format("%Y-%m-%d").to_string(),
        });

        let resp = self.post("transactions/get", body).await?;
        let parsed = resp
            .json::<TransactionsResponse>()
            .await
            .map_err(|e| AggregatorError::Parse(e.to_string()))?;

        let mut out = Vec::with_capacity(parsed.transactions.len());
        for tx in parsed.transactions {
            let amount = BigDecimal::from_f64(tx.amount)
                .ok_or_else(|| {
                    AggregatorError::Parse(format!(
                        "transaction {} has non-finite amount",
                        tx.transaction_id
                    ))
                })?
                .abs()
                .round(2);

            out.push(BankTransaction {
                id: tx.transaction_id,
                date: tx.date,
                name: tx.name,
                amount,
            });
        }

        Ok(out)
    }
}
