use std::collections::BTreeSet;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum and maximum auto-invest threshold accepted from clients, in USD.
pub const MIN_THRESHOLD_USD: f64 = 10.0;
pub const MAX_THRESHOLD_USD: f64 = 20.0;

/// How often round-ups are swept. Display/preference only; the trigger
/// itself runs whenever a caller invokes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoundupFrequency {
    #[serde(rename = "every")]
    Every,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
}

impl Default for RoundupFrequency {
    fn default() -> Self {
        RoundupFrequency::Every
    }
}

impl std::fmt::Display for RoundupFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundupFrequency::Every => write!(f, "every"),
            RoundupFrequency::Daily => write!(f, "daily"),
            RoundupFrequency::Weekly => write!(f, "weekly"),
        }
    }
}

impl std::str::FromStr for RoundupFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every" => Ok(RoundupFrequency::Every),
            "daily" => Ok(RoundupFrequency::Daily),
            "weekly" => Ok(RoundupFrequency::Weekly),
            _ => Err(format!("Invalid roundup frequency: {}", s)),
        }
    }
}

/// Per-user investment bookkeeping record.
///
/// `invested_transaction_ids` is append-only: once a transaction id has been
/// folded into a completed purchase it never leaves the set, which is what
/// keeps repeated evaluations from investing the same round-ups twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInvestmentState {
    pub user_id: Uuid,

    pub threshold: BigDecimal,
    pub selected_asset: String,
    pub roundup_frequency: RoundupFrequency,

    /// Access token handed back by the aggregator's link flow, if the user
    /// has connected a bank. Never serialized into client responses.
    pub aggregator_credential: Option<String>,
    pub exchange_linked: bool,

    pub invested_transaction_ids: BTreeSet<String>,
    pub last_investment_amount: Option<BigDecimal>,
    pub last_investment_date: Option<DateTime<Utc>>,
    pub last_investment_asset: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserInvestmentState {
    /// Default record created on first access for a user.
    pub fn default_for_user(user_id: Uuid) -> Self {
        Self {
            user_id,
            threshold: BigDecimal::from(10),
            selected_asset: "BTC".to_string(),
            roundup_frequency: RoundupFrequency::Every,
            aggregator_credential: None,
            exchange_linked: false,
            invested_transaction_ids: BTreeSet::new(),
            last_investment_amount: None,
            last_investment_date: None,
            last_investment_asset: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Fold a completed purchase into the record: append the contributing
    /// transaction ids and refresh the last-investment summary. Both writes
    /// land in the same record so the store commits them together.
    pub fn record_investment(
        &mut self,
        amount: BigDecimal,
        asset: &str,
        contributing_ids: &[String],
        at: DateTime<Utc>,
    ) {
        self.invested_transaction_ids
            .extend(contributing_ids.iter().cloned());
        self.last_investment_amount = Some(amount);
        self.last_investment_date = Some(at);
        self.last_investment_asset = Some(asset.to_string());
        self.updated_at = at;
    }
}

/// Input for updating investment preferences. Absent fields keep their
/// current values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePreferences {
    pub threshold: Option<f64>,
    pub selected_asset: Option<String>,
    pub roundup_frequency: Option<RoundupFrequency>,
}

impl UpdatePreferences {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(threshold) = self.threshold {
            if !(MIN_THRESHOLD_USD..=MAX_THRESHOLD_USD).contains(&threshold) {
                return Err(format!(
                    "Threshold must be between {} and {} USD, got {}",
                    MIN_THRESHOLD_USD, MAX_THRESHOLD_USD, threshold
                ));
            }
        }

        if let Some(asset) = &self.selected_asset {
            let valid_symbol = (2..=6).contains(&asset.len())
                && asset.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
            if !valid_symbol {
                return Err(format!("Invalid asset symbol: {}", asset));
            }
        }

        Ok(())
    }

    /// Apply the update to an existing record in place.
    pub fn apply_to(&self, state: &mut UserInvestmentState) -> Result<(), String> {
        self.validate()?;

        if let Some(threshold) = self.threshold {
            state.threshold = BigDecimal::from_f64(threshold)
                .ok_or_else(|| format!("Threshold is not a valid amount: {}", threshold))?
                .round(2);
        }
        if let Some(asset) = &self.selected_asset {
            state.selected_asset = asset.clone();
        }
        if let Some(frequency) = self.roundup_frequency {
            state.roundup_frequency = frequency;
        }
        state.updated_at = Utc::now();

        Ok(())
    }
}

/// Client-facing view of the record. The aggregator credential stays
/// server-side; only its presence is reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentStateResponse {
    pub user_id: Uuid,
    pub threshold: f64,
    pub selected_asset: String,
    pub roundup_frequency: RoundupFrequency,
    pub aggregator_linked: bool,
    pub exchange_linked: bool,
    pub invested_transaction_count: usize,
    pub last_investment_amount: Option<f64>,
    pub last_investment_date: Option<DateTime<Utc>>,
    pub last_investment_asset: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserInvestmentState> for InvestmentStateResponse {
    fn from(state: UserInvestmentState) -> Self {
        Self {
            user_id: state.user_id,
            threshold: state.threshold.to_f64().unwrap_or(0.0),
            selected_asset: state.selected_asset,
            roundup_frequency: state.roundup_frequency,
            aggregator_linked: state.aggregator_credential.is_some(),
            exchange_linked: state.exchange_linked,
            invested_transaction_count: state.invested_transaction_ids.len(),
            last_investment_amount: state
                .last_investment_amount
                .as_ref()
                .and_then(|amount| amount.to_f64()),
            last_investment_date: state.last_investment_date,
            last_investment_asset: state.last_investment_asset,
            updated_at: state.updated_at,
        }
    }
}
