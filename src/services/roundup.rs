use std::collections::BTreeSet;

use bigdecimal::{BigDecimal, One, Zero};

use crate::models::{BankTransaction, RoundupRecord, UninvestedTotal};

/// Round-up for a single non-negative amount carrying two fraction digits:
/// the distance to the next whole dollar, or zero when the amount is already
/// whole. Always in `[0, 1)`.
pub fn compute_roundup(amount: &BigDecimal) -> BigDecimal {
    // with_scale truncates, which is floor for non-negative values.
    let fractional = amount - amount.with_scale(0);
    if fractional.is_zero() {
        return BigDecimal::zero();
    }
    (BigDecimal::one() - fractional).round(2)
}

/// Annotate each transaction with its round-up.
pub fn roundup_records(transactions: &[BankTransaction]) -> Vec<RoundupRecord> {
    transactions
        .iter()
        .map(|tx| RoundupRecord {
            transaction_id: tx.id.clone(),
            roundup: compute_roundup(&tx.amount),
        })
        .collect()
}

/// Sum the round-ups of every transaction not yet marked invested.
///
/// Returns the ids that went into the sum alongside the total, so a
/// subsequent investment can mark exactly this set even if the transaction
/// feed grows in the meantime. Ids with a zero round-up are still listed:
/// they were part of the evaluated set and marking them avoids reprocessing
/// them forever.
pub fn compute_uninvested_total(
    transactions: &[BankTransaction],
    invested_ids: &BTreeSet<String>,
) -> UninvestedTotal {
    let mut total = BigDecimal::zero();
    let mut contributing_ids = Vec::new();

    for tx in transactions {
        if invested_ids.contains(&tx.id) {
            continue;
        }
        total += compute_roundup(&tx.amount);
        contributing_ids.push(tx.id.clone());
    }

    UninvestedTotal {
        total: total.round(2),
        contributing_ids,
    }
}
