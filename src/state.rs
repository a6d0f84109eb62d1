use std::sync::Arc;

use crate::external::aggregator::TransactionAggregator;
use crate::external::exchange::Exchange;
use crate::services::user_locks::UserLocks;
use crate::store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub aggregator: Arc<dyn TransactionAggregator>,
    pub exchange: Arc<dyn Exchange>,
    pub user_locks: UserLocks,
}
