use std::sync::Arc;

use tracing::info;

use tourmate_db::Database;
use tourmate_gateway::dispatcher::Dispatcher;
use tourmate_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourmate=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let db = Arc::new(Database::open(&config.db_path)?);
    let app = tourmate_server::app(db, Dispatcher::new());

    info!("Tourmate chat server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
