use axum::Router;
use tower_http::cors::CorsLayer;

use crate::routes::{aggregator, exchange, health, invest, preferences};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            preferences::router()
                .merge(invest::router())
                .merge(aggregator::router())
                .merge(exchange::router()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
