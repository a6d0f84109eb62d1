use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// Result of one uninvested-balance evaluation: the summed round-ups of
/// every not-yet-invested transaction, plus the exact ids that produced it.
///
/// The id list is what gets marked invested after a successful purchase, so
/// it must describe precisely the set that was summed, including
/// transactions whose round-up was zero.
#[derive(Debug, Clone, PartialEq)]
pub struct UninvestedTotal {
    pub total: BigDecimal,
    pub contributing_ids: Vec<String>,
}

/// Outcome of a single auto-invest evaluation.
///
/// Below-threshold and not-linked are ordinary outcomes, not errors; failed
/// evaluations surface as `Err(AppError)` from the service instead.
#[derive(Debug, Clone, PartialEq)]
pub enum InvestOutcome {
    NotLinked,
    BelowThreshold {
        current_total: BigDecimal,
        threshold: BigDecimal,
    },
    Invested {
        amount: BigDecimal,
        asset: String,
        order_id: String,
        order_status: String,
        contributing_ids: Vec<String>,
        date: DateTime<Utc>,
    },
}

/// Receipt for a one-off invest of a caller-supplied amount. Does not touch
/// round-up bookkeeping.
#[derive(Debug, Clone)]
pub struct DirectInvestReceipt {
    pub amount: BigDecimal,
    pub asset: String,
    pub deposit_id: Option<String>,
    pub order_id: String,
    pub order_status: String,
    pub date: DateTime<Utc>,
}
