use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive, Zero};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::external::exchange::{DepositReceipt, Exchange, OrderReceipt};
use crate::models::{
    BankTransaction, DirectInvestReceipt, InvestOutcome, TransactionWithRoundup, UninvestedTotal,
    UserInvestmentState,
};
use crate::services::{roundup, user_state};
use crate::state::AppState;
use crate::store::{StoreError, VersionedState};

/// How far back transactions are pulled on each evaluation. Policy knob,
/// not a correctness constraint.
const LOOKBACK_DAYS: i64 = 30;

/// How many times the post-purchase bookkeeping write is retried before
/// giving up and demanding reconciliation.
const MARK_RETRIES: u32 = 3;

/// Evaluate a user's accumulated round-ups and invest them if they cross
/// the threshold.
///
/// The user's lock is held for the whole evaluation, so at most one of
/// these can be in flight per user; a second caller blocks, then recomputes
/// against the updated invested set and lands below threshold instead of
/// buying twice. Safe to call repeatedly: failures mutate nothing.
pub async fn evaluate_and_invest(
    app: &AppState,
    user_id: Uuid,
) -> Result<InvestOutcome, AppError> {
    let _guard = app.user_locks.acquire(user_id).await;

    let versioned = user_state::load_or_create(app.store.as_ref(), user_id).await?;
    if !versioned.state.exchange_linked {
        return Ok(InvestOutcome::NotLinked);
    }

    let transactions = fetch_recent_transactions(app, &versioned.state).await?;
    let uninvested = roundup::compute_uninvested_total(
        &transactions,
        &versioned.state.invested_transaction_ids,
    );

    if uninvested.total < versioned.state.threshold {
        debug!(
            "user {}: roundup total {} below threshold {}",
            user_id, uninvested.total, versioned.state.threshold
        );
        return Ok(InvestOutcome::BelowThreshold {
            current_total: uninvested.total,
            threshold: versioned.state.threshold.clone(),
        });
    }

    let asset = versioned.state.selected_asset.clone();
    info!(
        "user {}: roundup total {} crossed threshold {}, buying {}",
        user_id, uninvested.total, versioned.state.threshold, asset
    );

    let (_deposit, order) =
        execute_funded_purchase(app.exchange.as_ref(), &uninvested.total, &asset).await?;

    let now = Utc::now();
    mark_invested(app, user_id, versioned, &uninvested, &asset, &order, now).await?;

    info!(
        "user {}: invested {} USD in {} (order {})",
        user_id, uninvested.total, asset, order.id
    );
    Ok(InvestOutcome::Invested {
        amount: uninvested.total,
        asset,
        order_id: order.id,
        order_status: order.status,
        contributing_ids: uninvested.contributing_ids,
        date: now,
    })
}

/// Read-only projection of what the next evaluation would see. Uses the
/// same filtering as the trigger so the dashboard number never disagrees
/// with the investment decision.
pub async fn get_uninvested_total(
    app: &AppState,
    user_id: Uuid,
) -> Result<(UninvestedTotal, UserInvestmentState), AppError> {
    let state = user_state::load_or_create(app.store.as_ref(), user_id)
        .await?
        .state;
    let transactions = fetch_recent_transactions(app, &state).await?;
    let uninvested =
        roundup::compute_uninvested_total(&transactions, &state.invested_transaction_ids);
    Ok((uninvested, state))
}

/// Recent transactions annotated with their round-ups, for display.
pub async fn list_recent_transactions(
    app: &AppState,
    user_id: Uuid,
) -> Result<Vec<TransactionWithRoundup>, AppError> {
    let state = user_state::load_or_create(app.store.as_ref(), user_id)
        .await?
        .state;
    let transactions = fetch_recent_transactions(app, &state).await?;
    let records = roundup::roundup_records(&transactions);

    Ok(transactions
        .iter()
        .zip(records)
        .map(|(tx, record)| TransactionWithRoundup {
            id: tx.id.clone(),
            date: tx.date,
            name: tx.name.clone(),
            amount: tx.amount.to_f64().unwrap_or(0.0),
            roundup: record.roundup.to_f64().unwrap_or(0.0),
        })
        .collect())
}

/// One-off purchase of a caller-supplied amount. Runs the same funded
/// purchase sequence as the trigger but leaves round-up bookkeeping alone.
pub async fn direct_invest(
    app: &AppState,
    user_id: Uuid,
    amount: f64,
    asset: Option<String>,
) -> Result<DirectInvestReceipt, AppError> {
    let amount = BigDecimal::from_f64(amount)
        .ok_or_else(|| AppError::Validation(format!("Amount is not a valid number: {}", amount)))?
        .round(2);
    if amount <= BigDecimal::zero() {
        return Err(AppError::Validation("Amount must be positive".into()));
    }

    let state = user_state::load_or_create(app.store.as_ref(), user_id)
        .await?
        .state;
    if !state.exchange_linked {
        return Err(AppError::Validation(
            "Exchange account is not linked".into(),
        ));
    }

    let asset = asset
        .map(|a| a.to_uppercase())
        .unwrap_or(state.selected_asset);
    info!("user {}: direct invest of {} USD in {}", user_id, amount, asset);

    let (deposit, order) =
        execute_funded_purchase(app.exchange.as_ref(), &amount, &asset).await?;

    Ok(DirectInvestReceipt {
        amount,
        asset,
        deposit_id: deposit.map(|receipt| receipt.id),
        order_id: order.id,
        order_status: order.status,
        date: Utc::now(),
    })
}

async fn fetch_recent_transactions(
    app: &AppState,
    state: &UserInvestmentState,
) -> Result<Vec<BankTransaction>, AppError> {
    let access_token = state
        .aggregator_credential
        .as_deref()
        .ok_or_else(|| AppError::Config("No bank connection on file for this user".into()))?;

    let end_date = Utc::now().date_naive();
    let start_date = end_date - Duration::days(LOOKBACK_DAYS);

    Ok(app
        .aggregator
        .fetch_transactions(access_token, start_date, end_date)
        .await?)
}

/// Fund-and-buy as one logical unit. The account's fiat balance is probed
/// first and a deposit issued only when it cannot cover the order, which is
/// also what keeps a retried evaluation from depositing twice after a
/// deposit-then-crash. If the deposit lands but the buy fails, the caller
/// sees an error and marks nothing: the same total is recomputed and
/// retried on the next evaluation.
async fn execute_funded_purchase(
    exchange: &dyn Exchange,
    amount: &BigDecimal,
    asset: &str,
) -> Result<(Option<DepositReceipt>, OrderReceipt), AppError> {
    let balance = exchange.fiat_balance().await?;

    let deposit = if balance < *amount {
        let receipt = exchange.deposit_fiat(amount).await?;
        info!(
            "deposited {} USD to cover order (receipt {}, status {})",
            amount, receipt.id, receipt.status
        );
        Some(receipt)
    } else {
        None
    };

    let order = exchange.purchase(amount, asset).await?;
    Ok((deposit, order))
}

/// Commit the invested ids and the last-investment summary in one store
/// write. A lost version race is retried against the reloaded record;
/// anything that still fails after the purchase settled is the
/// reconciliation case: the order went through but the ledger is behind.
async fn mark_invested(
    app: &AppState,
    user_id: Uuid,
    mut versioned: VersionedState,
    uninvested: &UninvestedTotal,
    asset: &str,
    order: &OrderReceipt,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut attempts = 0;
    loop {
        let mut record = versioned.state.clone();
        record.record_investment(
            uninvested.total.clone(),
            asset,
            &uninvested.contributing_ids,
            now,
        );

        let failure = match app
            .store
            .compare_and_swap(user_id, Some(versioned.version), record)
            .await
        {
            Ok(_) => return Ok(()),
            Err(source) if attempts >= MARK_RETRIES => {
                return Err(reconciliation_error(user_id, order, uninvested, source))
            }
            Err(source) => source,
        };

        attempts += 1;
        warn!(
            "user {}: bookkeeping write failed ({}), retrying ({}/{})",
            user_id, failure, attempts, MARK_RETRIES
        );

        // A lost version race needs the current record; other failures
        // retry against the version already in hand.
        if matches!(failure, StoreError::VersionConflict(_)) {
            versioned = match app.store.load(user_id).await {
                Ok(Some(current)) => current,
                Ok(None) => {
                    return Err(reconciliation_error(
                        user_id,
                        order,
                        uninvested,
                        StoreError::Unavailable("record disappeared during bookkeeping".into()),
                    ))
                }
                Err(source) => {
                    return Err(reconciliation_error(user_id, order, uninvested, source))
                }
            };
        }
    }
}

fn reconciliation_error(
    user_id: Uuid,
    order: &OrderReceipt,
    uninvested: &UninvestedTotal,
    source: StoreError,
) -> AppError {
    error!(
        "RECONCILIATION REQUIRED: user {} order {} for {} USD settled but marking transactions {:?} failed: {}",
        user_id, order.id, uninvested.total, uninvested.contributing_ids, source
    );
    AppError::Reconciliation {
        order_id: order.id.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::external::aggregator::{
        AggregatorCredential, AggregatorError, TransactionAggregator,
    };
    use crate::external::exchange::{AssetBalance, ExchangeError};
    use crate::external::mock::MockExchange;
    use crate::services::user_locks::UserLocks;
    use crate::store::memory::InMemoryStateStore;
    use crate::store::StateStore;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn tx(id: &str, amount: &str) -> BankTransaction {
        BankTransaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 7, 15).unwrap(),
            name: format!("Merchant {}", id),
            amount: dec(amount),
        }
    }

    /// Twenty-one $0.50 charges (round-up $0.50 each, $10.50 total) plus a
    /// whole-dollar charge that contributes an id but no money.
    fn transactions_over_threshold() -> Vec<BankTransaction> {
        let mut txs: Vec<BankTransaction> = (0..21)
            .map(|i| tx(&format!("tx-{:02}", i), "0.50"))
            .collect();
        txs.push(tx("whole-90", "90.00"));
        txs
    }

    struct StaticAggregator {
        transactions: Vec<BankTransaction>,
        fetches: AtomicUsize,
    }

    impl StaticAggregator {
        fn new(transactions: Vec<BankTransaction>) -> Self {
            Self {
                transactions,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TransactionAggregator for StaticAggregator {
        async fn create_link_token(&self, _user_id: Uuid) -> Result<String, AggregatorError> {
            Ok("link-sandbox-token".to_string())
        }

        async fn exchange_public_token(
            &self,
            _public_token: &str,
        ) -> Result<AggregatorCredential, AggregatorError> {
            Ok(AggregatorCredential {
                access_token: "access-test".to_string(),
                item_id: "item-test".to_string(),
            })
        }

        async fn fetch_transactions(
            &self,
            _access_token: &str,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
        ) -> Result<Vec<BankTransaction>, AggregatorError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.transactions.clone())
        }
    }

    struct FailingExchange;

    #[async_trait]
    impl Exchange for FailingExchange {
        async fn fiat_balance(&self) -> Result<BigDecimal, ExchangeError> {
            Ok(BigDecimal::from(100))
        }

        async fn deposit_fiat(
            &self,
            _amount: &BigDecimal,
        ) -> Result<DepositReceipt, ExchangeError> {
            Err(ExchangeError::Network("connection reset".into()))
        }

        async fn purchase(
            &self,
            _amount: &BigDecimal,
            _asset: &str,
        ) -> Result<OrderReceipt, ExchangeError> {
            Err(ExchangeError::Network("connection reset".into()))
        }

        async fn held_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
            Ok(Vec::new())
        }
    }

    struct DepositThenFailExchange {
        deposits: AtomicUsize,
    }

    #[async_trait]
    impl Exchange for DepositThenFailExchange {
        async fn fiat_balance(&self) -> Result<BigDecimal, ExchangeError> {
            Ok(BigDecimal::zero())
        }

        async fn deposit_fiat(
            &self,
            _amount: &BigDecimal,
        ) -> Result<DepositReceipt, ExchangeError> {
            self.deposits.fetch_add(1, Ordering::SeqCst);
            Ok(DepositReceipt {
                id: "dep-1".to_string(),
                status: "completed".to_string(),
            })
        }

        async fn purchase(
            &self,
            _amount: &BigDecimal,
            _asset: &str,
        ) -> Result<OrderReceipt, ExchangeError> {
            Err(ExchangeError::Network("gateway timeout".into()))
        }

        async fn held_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
            Ok(Vec::new())
        }
    }

    /// Store whose writes can be switched off, for the post-purchase
    /// bookkeeping failure path.
    struct BrokenStore {
        inner: InMemoryStateStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn load(
            &self,
            user_id: Uuid,
        ) -> Result<Option<VersionedState>, StoreError> {
            self.inner.load(user_id).await
        }

        async fn compare_and_swap(
            &self,
            user_id: Uuid,
            expected_version: Option<u64>,
            state: UserInvestmentState,
        ) -> Result<VersionedState, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("storage offline".into()));
            }
            self.inner.compare_and_swap(user_id, expected_version, state).await
        }
    }

    fn app_with(
        store: Arc<dyn StateStore>,
        aggregator: Arc<dyn TransactionAggregator>,
        exchange: Arc<dyn Exchange>,
    ) -> AppState {
        AppState {
            store,
            aggregator,
            exchange,
            user_locks: UserLocks::new(),
        }
    }

    async fn seed_user<F>(app: &AppState, configure: F) -> Uuid
    where
        F: FnOnce(&mut UserInvestmentState),
    {
        let user_id = Uuid::new_v4();
        let mut state = UserInvestmentState::default_for_user(user_id);
        configure(&mut state);
        app.store
            .compare_and_swap(user_id, None, state)
            .await
            .unwrap();
        user_id
    }

    fn linked(state: &mut UserInvestmentState) {
        state.exchange_linked = true;
        state.aggregator_credential = Some("access-test".to_string());
    }

    async fn invested_ids(app: &AppState, user_id: Uuid) -> BTreeSet<String> {
        app.store
            .load(user_id)
            .await
            .unwrap()
            .unwrap()
            .state
            .invested_transaction_ids
    }

    #[tokio::test]
    async fn test_not_linked_short_circuits_before_fetching() {
        let aggregator = Arc::new(StaticAggregator::new(transactions_over_threshold()));
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            aggregator.clone(),
            Arc::new(MockExchange::new()),
        );
        let user_id = seed_user(&app, |state| {
            state.aggregator_credential = Some("access-test".to_string());
        })
        .await;

        let outcome = evaluate_and_invest(&app, user_id).await.unwrap();

        assert_eq!(outcome, InvestOutcome::NotLinked);
        assert_eq!(aggregator.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_below_threshold_takes_no_action() {
        let aggregator = Arc::new(StaticAggregator::new(vec![
            tx("a", "4.25"),
            tx("b", "7.60"),
        ]));
        let exchange = Arc::new(MockExchange::new());
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            aggregator,
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        let outcome = evaluate_and_invest(&app, user_id).await.unwrap();

        assert_eq!(
            outcome,
            InvestOutcome::BelowThreshold {
                current_total: dec("1.15"),
                threshold: BigDecimal::from(10),
            }
        );
        assert!(exchange.purchases().await.is_empty());
        assert!(invested_ids(&app, user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_met_invests_and_marks_all_contributing_ids() {
        let exchange = Arc::new(MockExchange::new());
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(transactions_over_threshold())),
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        let outcome = evaluate_and_invest(&app, user_id).await.unwrap();

        match outcome {
            InvestOutcome::Invested {
                amount,
                asset,
                contributing_ids,
                ..
            } => {
                assert_eq!(amount, dec("10.50"));
                assert_eq!(asset, "BTC");
                assert_eq!(contributing_ids.len(), 22);
                assert!(contributing_ids.contains(&"whole-90".to_string()));
            }
            other => panic!("expected Invested, got {:?}", other),
        }

        // Exactly one purchase for exactly the summed amount; the account
        // was unfunded so a matching deposit preceded it.
        assert_eq!(exchange.purchases().await, vec![(dec("10.50"), "BTC".to_string())]);
        assert_eq!(exchange.deposits().await, vec![dec("10.50")]);

        let marked = invested_ids(&app, user_id).await;
        assert_eq!(marked.len(), 22);
        assert!(marked.contains("whole-90"));

        let state = app.store.load(user_id).await.unwrap().unwrap().state;
        assert_eq!(state.last_investment_amount, Some(dec("10.50")));
        assert_eq!(state.last_investment_asset.as_deref(), Some("BTC"));
        assert!(state.last_investment_date.is_some());
    }

    #[tokio::test]
    async fn test_marked_ids_stay_excluded_on_later_evaluations() {
        let exchange = Arc::new(MockExchange::new());
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(transactions_over_threshold())),
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        let first = evaluate_and_invest(&app, user_id).await.unwrap();
        assert!(matches!(first, InvestOutcome::Invested { .. }));

        let second = evaluate_and_invest(&app, user_id).await.unwrap();
        assert_eq!(
            second,
            InvestOutcome::BelowThreshold {
                current_total: BigDecimal::zero(),
                threshold: BigDecimal::from(10),
            }
        );
        assert_eq!(exchange.purchases().await.len(), 1);
    }

    #[tokio::test]
    async fn test_prefunded_account_skips_the_deposit() {
        let exchange = Arc::new(MockExchange::with_fiat_balance(BigDecimal::from(50)).await);
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(transactions_over_threshold())),
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        let outcome = evaluate_and_invest(&app, user_id).await.unwrap();

        assert!(matches!(outcome, InvestOutcome::Invested { .. }));
        assert!(exchange.deposits().await.is_empty());
        assert_eq!(exchange.purchases().await.len(), 1);
    }

    #[tokio::test]
    async fn test_already_invested_ids_reduce_the_total() {
        let aggregator = Arc::new(StaticAggregator::new(vec![
            tx("a", "4.25"),
            tx("b", "7.60"),
            tx("c", "90.00"),
        ]));
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            aggregator,
            Arc::new(MockExchange::new()),
        );
        let user_id = seed_user(&app, |state| {
            linked(state);
            state.invested_transaction_ids.insert("a".to_string());
        })
        .await;

        let outcome = evaluate_and_invest(&app, user_id).await.unwrap();

        assert_eq!(
            outcome,
            InvestOutcome::BelowThreshold {
                current_total: dec("0.40"),
                threshold: BigDecimal::from(10),
            }
        );
    }

    #[tokio::test]
    async fn test_exchange_failure_mutates_nothing_and_is_retryable() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let aggregator: Arc<dyn TransactionAggregator> =
            Arc::new(StaticAggregator::new(transactions_over_threshold()));
        let app = app_with(store.clone(), aggregator.clone(), Arc::new(FailingExchange));
        let user_id = seed_user(&app, linked).await;

        let result = evaluate_and_invest(&app, user_id).await;
        assert!(matches!(result, Err(AppError::Exchange(_))));
        assert!(invested_ids(&app, user_id).await.is_empty());

        // Same store, working exchange: the retry sees the same total and
        // completes the investment.
        let exchange = Arc::new(MockExchange::with_fiat_balance(BigDecimal::from(50)).await);
        let retry_app = app_with(store, aggregator, exchange.clone());

        let outcome = evaluate_and_invest(&retry_app, user_id).await.unwrap();
        match outcome {
            InvestOutcome::Invested { amount, .. } => assert_eq!(amount, dec("10.50")),
            other => panic!("expected Invested, got {:?}", other),
        }
        assert_eq!(exchange.purchases().await.len(), 1);
    }

    #[tokio::test]
    async fn test_deposit_success_purchase_failure_marks_nothing() {
        let exchange = Arc::new(DepositThenFailExchange {
            deposits: AtomicUsize::new(0),
        });
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(transactions_over_threshold())),
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        let result = evaluate_and_invest(&app, user_id).await;

        assert!(matches!(result, Err(AppError::Exchange(_))));
        assert_eq!(exchange.deposits.load(Ordering::SeqCst), 1);
        assert!(invested_ids(&app, user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_evaluations_invest_exactly_once() {
        let exchange = Arc::new(MockExchange::with_fiat_balance(BigDecimal::from(100)).await);
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(transactions_over_threshold())),
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        let (first, second) = tokio::join!(
            evaluate_and_invest(&app, user_id),
            evaluate_and_invest(&app, user_id),
        );

        let outcomes = [first.unwrap(), second.unwrap()];
        let invested = outcomes
            .iter()
            .filter(|o| matches!(o, InvestOutcome::Invested { .. }))
            .count();
        let below = outcomes
            .iter()
            .filter(|o| matches!(o, InvestOutcome::BelowThreshold { .. }))
            .count();

        assert_eq!(invested, 1);
        assert_eq!(below, 1);
        assert_eq!(exchange.purchases().await.len(), 1);
    }

    #[tokio::test]
    async fn test_bookkeeping_failure_after_purchase_demands_reconciliation() {
        let broken = Arc::new(BrokenStore {
            inner: InMemoryStateStore::new(),
            fail_writes: AtomicBool::new(false),
        });
        let exchange = Arc::new(MockExchange::with_fiat_balance(BigDecimal::from(100)).await);
        let app = app_with(
            broken.clone(),
            Arc::new(StaticAggregator::new(transactions_over_threshold())),
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        broken.fail_writes.store(true, Ordering::SeqCst);
        let result = evaluate_and_invest(&app, user_id).await;

        // The order went through but the ledger write did not: distinct
        // error, and the purchase is visible for reconciliation.
        assert!(matches!(result, Err(AppError::Reconciliation { .. })));
        assert_eq!(exchange.purchases().await.len(), 1);
        assert!(invested_ids(&app, user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_projection_matches_trigger_filtering() {
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(vec![
                tx("a", "4.25"),
                tx("b", "7.60"),
                tx("c", "90.00"),
            ])),
            Arc::new(MockExchange::new()),
        );
        let user_id = seed_user(&app, |state| {
            linked(state);
            state.invested_transaction_ids.insert("a".to_string());
        })
        .await;

        let (first, _) = get_uninvested_total(&app, user_id).await.unwrap();
        let (second, _) = get_uninvested_total(&app, user_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.total, dec("0.40"));
        assert_eq!(first.contributing_ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_missing_bank_connection_is_a_config_error() {
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(Vec::new())),
            Arc::new(MockExchange::new()),
        );
        let user_id = seed_user(&app, |state| {
            state.exchange_linked = true;
        })
        .await;

        let result = evaluate_and_invest(&app, user_id).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_direct_invest_skips_roundup_bookkeeping() {
        let exchange = Arc::new(MockExchange::new());
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(Vec::new())),
            exchange.clone(),
        );
        let user_id = seed_user(&app, linked).await;

        let receipt = direct_invest(&app, user_id, 25.0, Some("eth".to_string()))
            .await
            .unwrap();

        assert_eq!(receipt.amount, dec("25.00"));
        assert_eq!(receipt.asset, "ETH");
        assert!(receipt.deposit_id.is_some());
        assert_eq!(exchange.purchases().await, vec![(dec("25.00"), "ETH".to_string())]);
        assert!(invested_ids(&app, user_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_direct_invest_below_exchange_minimum_fails() {
        let app = app_with(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(StaticAggregator::new(Vec::new())),
            Arc::new(MockExchange::new()),
        );
        let user_id = seed_user(&app, linked).await;

        let result = direct_invest(&app, user_id, 5.0, None).await;
        assert!(matches!(
            result,
            Err(AppError::Exchange(ExchangeError::BelowMinimum { .. }))
        ));
    }
}
