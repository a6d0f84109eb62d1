use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bank transaction as reported by the aggregator.
///
/// `amount` is the absolute value of money moved, carried with two fraction
/// digits. The aggregator adapter normalizes signs before building these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub name: String,
    pub amount: BigDecimal,
}

/// Per-transaction round-up, recomputed on every evaluation and never stored.
#[derive(Debug, Clone, Serialize)]
pub struct RoundupRecord {
    pub transaction_id: String,
    pub roundup: BigDecimal,
}

/// Transaction annotated with its round-up, as served to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionWithRoundup {
    pub id: String,
    pub date: NaiveDate,
    pub name: String,
    pub amount: f64,
    pub roundup: f64,
}
