use tourney_server::{config, create_app, create_state, db};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load config
    let config = config::Config::from_env();
    tracing::info!("Starting tournament server on {}", config.server_addr());

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    // Run migrations
    db::run_migrations(&pool).await?;

    let state = create_state(pool, config.ledger.clone());

    // Interrupted or uncompensated entry-fee transfers from a previous run
    let unsettled = state.wallet.unsettled_sagas().await?;
    if !unsettled.is_empty() {
        tracing::warn!(
            "{} ledger sagas need reconciliation; see GET /wallet/reconciliation",
            unsettled.len()
        );
    }

    let app = create_app(state, &config.cors_allowed_origins);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("Server listening on {}", config.server_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
