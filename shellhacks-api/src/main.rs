//! # ShellHacks API Server
//!
//! Registration, application and organizer dashboard endpoints for the
//! ShellHacks applicant backend.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p shellhacks-api
//! ```
//!
//! Set `EMBEDDED_DISPATCHER=true` to deliver queued emails and spreadsheet
//! rows from this process instead of running `shellhacks-worker`.

use shellhacks_api::{
    app::{build_router, AppState},
    config::Config,
};
use shellhacks_shared::{
    auth::credentials::Argon2JwtCredentials,
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    integrations::FileStorage,
    lifecycle::{ApplicantLifecycle, Collaborators},
    outbox::PgEffectQueue,
    store::postgres::PgApplicantStore,
    validation::ValidationRules,
};
use shellhacks_worker::{
    adapters::{DisabledMirror, HttpMirror},
    build_dispatcher,
    config::WorkerConfig,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "ShellHacks API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let rules = ValidationRules::load_or_default(config.validation_rules_path.as_deref())?;

    let storage: Arc<dyn FileStorage> = match &config.mirror {
        Some(mirror) => Arc::new(HttpMirror::new(mirror)?),
        None => {
            if config.features.drive_upload_enabled {
                tracing::warn!("DRIVE_UPLOAD_ENABLED without MIRROR_ENDPOINT, resumes will be stored as N/A");
            }
            Arc::new(DisabledMirror)
        }
    };

    let lifecycle = ApplicantLifecycle::new(
        Collaborators {
            store: Arc::new(PgApplicantStore::new(pool.clone())),
            credentials: Arc::new(Argon2JwtCredentials::new(config.jwt.secret.clone())),
            effects: Arc::new(PgEffectQueue::new(pool.clone())),
            storage,
        },
        rules,
        config.lifecycle_config(),
    );

    let shutdown = CancellationToken::new();

    let dispatcher_handle = if config.embedded_dispatcher {
        let worker_config = WorkerConfig::from_env()?;
        let dispatcher = build_dispatcher(pool.clone(), &worker_config)?;
        let token = dispatcher.shutdown_token();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            stop.cancelled().await;
            token.cancel();
        });
        tracing::info!("Embedded outbox dispatcher enabled");
        Some(tokio::spawn(async move { dispatcher.run().await }))
    } else {
        None
    };

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(Arc::new(lifecycle), config));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = dispatcher_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Embedded dispatcher task failed");
        }
    }
    close_pool(pool).await;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shellhacks_api=debug,tower_http=debug".into());

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
