//! # ShellHacks Worker
//!
//! Standalone outbox dispatcher. Runs alongside the API (or instead of the
//! API's embedded dispatcher) and delivers queued emails and spreadsheet rows.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p shellhacks-worker
//! ```

use shellhacks_shared::db::migrations::run_migrations;
use shellhacks_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use shellhacks_worker::{build_dispatcher, config::WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("ShellHacks Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.database_max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let dispatcher = build_dispatcher(pool.clone(), &config)?;
    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        shutdown.cancel();
    });

    dispatcher.run().await;
    close_pool(pool).await;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shellhacks_worker=debug,shellhacks_shared=info".into());

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
