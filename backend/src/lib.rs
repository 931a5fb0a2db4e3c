//! Tournament Server Library
//!
//! Tournament registration with a wallet ledger: prize escrow at creation,
//! entry-fee transfers, result payouts and prize release. Exposes the server
//! components for integration testing.

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod tournament;
pub mod wallet;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Creates the application router with all endpoints
pub fn create_app(state: Arc<api::AppState>, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Tournament Server" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/organizers", api::organizers_router())
        .nest("/players", api::players_router())
        .nest("/tournaments", api::tournaments_router())
        .nest("/wallet", api::wallet_router())
        .with_state(state)
        .layer(cors)
}

/// Builds the shared state from a migrated pool
pub fn create_state(pool: db::DbPool, ledger: config::LedgerConfig) -> Arc<api::AppState> {
    let shared = Arc::new(pool.clone());
    Arc::new(api::AppState {
        pool,
        tournament_manager: Arc::new(tournament::TournamentManager::new(shared.clone(), ledger)),
        wallet: Arc::new(wallet::WalletService::new(shared)),
    })
}

/// Test helper to create an in-memory database and run migrations
pub async fn create_test_db() -> db::DbPool {
    let pool = db::create_memory_pool()
        .await
        .expect("Failed to create in-memory database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Test helper to create a fully configured test app
pub async fn create_test_app() -> (Router, Arc<api::AppState>) {
    let pool = create_test_db().await;
    let state = create_state(pool, config::LedgerConfig::default());
    let app = create_app(state.clone(), &[]);
    (app, state)
}
