use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{Duration, NaiveDate};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::external::aggregator::{AggregatorCredential, AggregatorError, TransactionAggregator};
use crate::external::exchange::{
    AssetBalance, DepositReceipt, Exchange, ExchangeError, OrderReceipt, MIN_ORDER_USD,
};
use crate::models::BankTransaction;

#[derive(Debug, Default)]
struct MockLedger {
    fiat_balance: BigDecimal,
    deposits: Vec<BigDecimal>,
    purchases: Vec<(BigDecimal, String)>,
}

/// In-memory exchange simulator, selectable with `EXCHANGE_PROVIDER=mock`.
///
/// Keeps a fiat ledger so the deposit-then-buy sequence behaves like the
/// real account: purchases draw on deposited funds and fail when the
/// balance cannot cover them. Also the test double for the invest services.
#[derive(Default)]
pub struct MockExchange {
    ledger: Mutex<MockLedger>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_fiat_balance(initial: BigDecimal) -> Self {
        let exchange = Self::new();
        exchange.ledger.lock().await.fiat_balance = initial;
        exchange
    }

    pub async fn deposits(&self) -> Vec<BigDecimal> {
        self.ledger.lock().await.deposits.clone()
    }

    pub async fn purchases(&self) -> Vec<(BigDecimal, String)> {
        self.ledger.lock().await.purchases.clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fiat_balance(&self) -> Result<BigDecimal, ExchangeError> {
        Ok(self.ledger.lock().await.fiat_balance.clone())
    }

    async fn deposit_fiat(&self, amount: &BigDecimal) -> Result<DepositReceipt, ExchangeError> {
        let mut ledger = self.ledger.lock().await;
        ledger.fiat_balance += amount;
        ledger.deposits.push(amount.clone());

        tracing::info!("[MOCK] deposited {} USD", amount);
        Ok(DepositReceipt {
            id: format!("mock-deposit-{}", Uuid::new_v4()),
            status: "completed".to_string(),
        })
    }

    async fn purchase(
        &self,
        amount: &BigDecimal,
        asset: &str,
    ) -> Result<OrderReceipt, ExchangeError> {
        if amount < &BigDecimal::from(MIN_ORDER_USD) {
            return Err(ExchangeError::BelowMinimum {
                amount: amount.clone(),
                minimum: MIN_ORDER_USD,
            });
        }

        let mut ledger = self.ledger.lock().await;
        if ledger.fiat_balance < *amount {
            return Err(ExchangeError::BadResponse(format!(
                "insufficient funds: balance {} USD, order {} USD",
                ledger.fiat_balance, amount
            )));
        }
        ledger.fiat_balance -= amount;
        ledger.purchases.push((amount.clone(), asset.to_string()));

        tracing::info!("[MOCK] bought {} USD of {}", amount, asset);
        Ok(OrderReceipt {
            id: format!("mock-buy-{}", Uuid::new_v4()),
            status: "completed".to_string(),
        })
    }

    async fn held_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
        let ledger = self.ledger.lock().await;
        let mut totals: Vec<AssetBalance> = Vec::new();
        for (amount, asset) in &ledger.purchases {
            match totals.iter_mut().find(|balance| balance.asset == *asset) {
                Some(balance) => balance.amount += amount,
                None => totals.push(AssetBalance {
                    asset: asset.clone(),
                    amount: amount.clone(),
                }),
            }
        }
        Ok(totals.into_iter().filter(|b| !b.amount.is_zero()).collect())
    }
}

const SAMPLE_CHARGES: &[(&str, &str)] = &[
    ("Blue Bottle Coffee", "4.25"),
    ("Corner Grocery", "7.60"),
    ("Transit Pass", "90.00"),
    ("Lunch Counter", "12.35"),
    ("Paperback Exchange", "18.99"),
    ("Laundromat", "6.75"),
    ("Taco Truck", "9.40"),
    ("Pharmacy", "23.18"),
    ("Streaming Subscription", "11.99"),
    ("Hardware Store", "41.03"),
];

/// Aggregator stand-in, selectable with `AGGREGATOR_PROVIDER=mock`.
///
/// Serves the same merchant charges on every fetch, dated inside the
/// requested window. Ids are stable across fetches, so invested-set
/// filtering behaves exactly as it does against the real feed.
#[derive(Default)]
pub struct MockAggregator;

impl MockAggregator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransactionAggregator for MockAggregator {
    async fn create_link_token(&self, user_id: Uuid) -> Result<String, AggregatorError> {
        Ok(format!("link-mock-{}", user_id))
    }

    async fn exchange_public_token(
        &self,
        _public_token: &str,
    ) -> Result<AggregatorCredential, AggregatorError> {
        Ok(AggregatorCredential {
            access_token: "access-mock".to_string(),
            item_id: "item-mock".to_string(),
        })
    }

    async fn fetch_transactions(
        &self,
        _access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<BankTransaction>, AggregatorError> {
        let window_days = (end_date - start_date).num_days().max(1);

        Ok(SAMPLE_CHARGES
            .iter()
            .enumerate()
            .map(|(i, (name, amount))| BankTransaction {
                id: format!("mock-tx-{:03}", i),
                date: end_date - Duration::days((i as i64 * 3) % window_days),
                name: (*name).to_string(),
                amount: BigDecimal::from_str(amount)
                    .expect("sample amount is a valid decimal"),
            })
            .collect())
    }
}
