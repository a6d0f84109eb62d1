mod app;
mod errors;
mod external;
mod logging;
mod models;
mod routes;
mod services;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::external::aggregator::TransactionAggregator;
use crate::external::coinbase::CoinbaseExchange;
use crate::external::exchange::Exchange;
use crate::external::mock::{MockAggregator, MockExchange};
use crate::external::plaid::PlaidAggregator;
use crate::logging::{init_logging, LoggingConfig};
use crate::services::user_locks::UserLocks;
use crate::state::AppState;
use crate::store::memory::InMemoryStateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    // AGGREGATOR_PROVIDER=mock serves sample transactions without Plaid
    // credentials.
    let aggregator_name =
        std::env::var("AGGREGATOR_PROVIDER").unwrap_or_else(|_| "plaid".to_string());
    let aggregator: Arc<dyn TransactionAggregator> = match aggregator_name.to_lowercase().as_str()
    {
        "plaid" => {
            tracing::info!("🏦 Using aggregator provider: Plaid");
            Arc::new(
                PlaidAggregator::from_env()
                    .expect("Failed to create PlaidAggregator (check PLAID_CLIENT_ID / PLAID_SECRET)"),
            )
        }
        "mock" => {
            tracing::info!("🏦 Using aggregator provider: mock (sample transactions)");
            Arc::new(MockAggregator::new())
        }
        _ => {
            panic!(
                "Invalid AGGREGATOR_PROVIDER: {}. Must be 'plaid' or 'mock'",
                aggregator_name
            );
        }
    };

    // EXCHANGE_PROVIDER=mock runs the full flow without placing real orders.
    let provider_name =
        std::env::var("EXCHANGE_PROVIDER").unwrap_or_else(|_| "coinbase".to_string());
    let exchange: Arc<dyn Exchange> = match provider_name.to_lowercase().as_str() {
        "coinbase" => {
            tracing::info!("💱 Using exchange provider: Coinbase");
            Arc::new(
                CoinbaseExchange::from_env()
                    .expect("Failed to create CoinbaseExchange (check COINBASE_* variables)"),
            )
        }
        "mock" => {
            tracing::info!("💱 Using exchange provider: mock (no real orders)");
            Arc::new(MockExchange::new())
        }
        _ => {
            panic!(
                "Invalid EXCHANGE_PROVIDER: {}. Must be 'coinbase' or 'mock'",
                provider_name
            );
        }
    };

    let state = AppState {
        store: Arc::new(InMemoryStateStore::new()),
        aggregator,
        exchange,
        user_locks: UserLocks::new(),
    };
    let app = app::create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Roundly backend running at http://{}/", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
