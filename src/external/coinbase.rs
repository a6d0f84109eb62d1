use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::str::FromStr;

use crate::external::exchange::{
    AssetBalance, DepositReceipt, Exchange, ExchangeError, OrderReceipt, MIN_ORDER_USD,
};

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.coinbase.com";
const API_VERSION: &str = "2023-04-13";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Coinbase v2 client. All calls are signed with the account's API secret
/// and run against the single account/payment method named in the
/// environment.
pub struct CoinbaseExchange {
    client: reqwest::Client,
    api_key: String,
    api_secret: String,
    account_id: String,
    payment_method_id: String,
}

impl CoinbaseExchange {
    pub fn from_env() -> Result<Self, ExchangeError> {
        let required = [
            "COINBASE_API_KEY",
            "COINBASE_API_SECRET",
            "COINBASE_ACCOUNT_ID",
            "COINBASE_PAYMENT_METHOD_ID",
        ];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|var| std::env::var(var).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(ExchangeError::NotConfigured(format!(
                "missing environment variables: {}",
                missing.join(", ")
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: std::env::var("COINBASE_API_KEY").unwrap_or_default(),
            api_secret: std::env::var("COINBASE_API_SECRET").unwrap_or_default(),
            account_id: std::env::var("COINBASE_ACCOUNT_ID").unwrap_or_default(),
            payment_method_id: std::env::var("COINBASE_PAYMENT_METHOD_ID").unwrap_or_default(),
        })
    }

    async fn signed_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ExchangeError> {
        let request_path = format!("/v2/{}", endpoint);
        let body_string = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ExchangeError::Network(format!("clock error: {}", e)))?
            .as_secs()
            .to_string();

        let prehash = format!("{}{}{}{}", timestamp, method.as_str(), request_path, body_string);
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::NotConfigured(format!("invalid API secret: {}", e)))?;
        mac.update(prehash.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut request = self
            .client
            .request(method, format!("{}{}", BASE_URL, request_path))
            .header("CB-ACCESS-KEY", &self.api_key)
            .header("CB-ACCESS-SIGN", signature)
            .header("CB-ACCESS-TIMESTAMP", timestamp)
            .header("CB-VERSION", API_VERSION);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited);
        }

        let status = resp.status();
        let payload = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))?;

        if !status.is_success() {
            let message = payload
                .get("errors")
                .and_then(|errors| errors.get(0))
                .and_then(|error| error.get("message"))
                .and_then(|message| message.as_str())
                .unwrap_or("unknown error");
            return Err(ExchangeError::BadResponse(format!(
                "HTTP {}: {}",
                status, message
            )));
        }

        Ok(payload)
    }
}

fn format_usd(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

#[derive(Debug, Deserialize)]
struct ReceiptData {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    balance: MoneyData,
    currency: CurrencyData,
}

#[derive(Debug, Deserialize)]
struct MoneyData {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyData {
    code: String,
}

fn parse_receipt(payload: serde_json::Value) -> Result<ReceiptData, ExchangeError> {
    let data = payload
        .get("data")
        .cloned()
        .ok_or_else(|| ExchangeError::BadResponse("missing data field".into()))?;
    serde_json::from_value(data).map_err(|e| ExchangeError::Parse(e.to_string()))
}

#[async_trait]
impl Exchange for CoinbaseExchange {
    async fn fiat_balance(&self) -> Result<BigDecimal, ExchangeError> {
        let payload = self
            .signed_request(Method::GET, &format!("accounts/{}", self.account_id), None)
            .await?;

        let data = payload
            .get("data")
            .cloned()
            .ok_or_else(|| ExchangeError::BadResponse("missing data field".into()))?;
        let account: AccountData =
            serde_json::from_value(data).map_err(|e| ExchangeError::Parse(e.to_string()))?;

        BigDecimal::from_str(&account.balance.amount)
            .map_err(|e| ExchangeError::Parse(e.to_string()))
    }

    async fn deposit_fiat(&self, amount: &BigDecimal) -> Result<DepositReceipt, ExchangeError> {
        let body = json!({
            "amount": format_usd(amount),
            "currency": "USD",
            "payment_method": self.payment_method_id,
        });

        let payload = self
            .signed_request(
                Method::POST,
                &format!("accounts/{}/deposits", self.account_id),
                Some(body),
            )
            .await?;

        let receipt = parse_receipt(payload)?;
        Ok(DepositReceipt {
            id: receipt.id,
            status: receipt.status,
        })
    }

    async fn purchase(
        &self,
        amount: &BigDecimal,
        _asset: &str,
    ) -> Result<OrderReceipt, ExchangeError> {
        if amount < &BigDecimal::from(MIN_ORDER_USD) {
            return Err(ExchangeError::BelowMinimum {
                amount: amount.clone(),
                minimum: MIN_ORDER_USD,
            });
        }

        // The buy runs against the asset account named by COINBASE_ACCOUNT_ID;
        // the funded currency is always USD.
        let body = json!({
            "amount": format_usd(amount),
            "currency": "USD",
            "payment_method": self.payment_method_id,
            "commit": true,
        });

        let payload = self
            .signed_request(
                Method::POST,
                &format!("accounts/{}/buys", self.account_id),
                Some(body),
            )
            .await?;

        let receipt = parse_receipt(payload)?;
        Ok(OrderReceipt {
            id: receipt.id,
            status: receipt.status,
        })
    }

    async fn held_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
        let payload = self.signed_request(Method::GET, "accounts", None).await?;

        let data = payload
            .get("data")
            .cloned()
            .ok_or_else(|| ExchangeError::BadResponse("missing data field".into()))?;
        let accounts: Vec<AccountData> =
            serde_json::from_value(data).map_err(|e| ExchangeError::Parse(e.to_string()))?;

        let mut balances = Vec::new();
        for account in accounts {
            let amount = BigDecimal::from_str(&account.balance.amount)
                .map_err(|e| ExchangeError::Parse(e.to_string()))?;
            if amount > BigDecimal::from(0) && account.currency.code != "USD" {
                balances.push(AssetBalance {
                    asset: account.currency.code,
                    amount,
                });
            }
        }

        Ok(balances)
    }
}
