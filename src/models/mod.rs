mod invest;
mod investment_state;
mod transaction;

pub use invest::{DirectInvestReceipt, InvestOutcome, UninvestedTotal};
pub use investment_state::{
    InvestmentStateResponse, RoundupFrequency, UpdatePreferences, UserInvestmentState,
    MAX_THRESHOLD_USD, MIN_THRESHOLD_USD,
};
pub use transaction::{BankTransaction, RoundupRecord, TransactionWithRoundup};
