use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;

/// Smallest USD order the exchange accepts.
pub const MIN_ORDER_USD: u32 = 10;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange is not configured: {0}")]
    NotConfigured(String),

    #[error("order of {amount} USD is below the {minimum} USD exchange minimum")]
    BelowMinimum { amount: BigDecimal, minimum: u32 },

    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

#[derive(Debug, Clone)]
pub struct DepositReceipt {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct AssetBalance {
    pub asset: String,
    pub amount: BigDecimal,
}

/// Custodial exchange collaborator: fiat funding and market purchases against
/// a single linked account.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// USD available in the exchange account right now.
    async fn fiat_balance(&self) -> Result<BigDecimal, ExchangeError>;

    /// Pull `amount` USD from the linked payment method into the account.
    ///
    /// Not known to be idempotent: retrying after a timeout may deposit
    /// twice. Callers decide whether a deposit is needed by probing
    /// `fiat_balance` first rather than depositing unconditionally.
    async fn deposit_fiat(&self, amount: &BigDecimal) -> Result<DepositReceipt, ExchangeError>;

    /// Market-buy `amount` USD worth of `asset`. Fails with `BelowMinimum`
    /// for orders under `MIN_ORDER_USD`.
    async fn purchase(
        &self,
        amount: &BigDecimal,
        asset: &str,
    ) -> Result<OrderReceipt, ExchangeError>;

    /// Non-zero crypto balances held in the account, for display.
    async fn held_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError>;
}
