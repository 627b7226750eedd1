//! # ShellHacks Worker Library
//!
//! Delivers the side effects the API records in the outbox: emails through
//! SMTP and rows/files through the spreadsheet bridge.
//!
//! ## Modules
//!
//! - `adapters`: Notifier, sheet mirror and file storage implementations
//! - `config`: Environment configuration
//! - `dispatcher`: Claim/deliver/retry loop
//! - `queue`: `outbox_jobs` access
//!
//! ## Example
//!
//! ```no_run
//! use shellhacks_worker::{build_dispatcher, config::WorkerConfig};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> anyhow::Result<()> {
//! let config = WorkerConfig::from_env()?;
//! let dispatcher = build_dispatcher(pool, &config)?;
//! dispatcher.run().await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod dispatcher;
pub mod queue;

use shellhacks_shared::integrations::{Notifier, SheetMirror};
use sqlx::PgPool;
use std::sync::Arc;

use adapters::{DisabledMirror, HttpMirror, LogNotifier, SmtpNotifier, TemplateRenderer};
use config::WorkerConfig;
use dispatcher::Dispatcher;
use queue::OutboxQueue;

/// Picks the notifier for `config`: SMTP when a relay is configured,
/// otherwise log-only
pub fn build_notifier(config: &WorkerConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    let renderer = TemplateRenderer::new(&config.portal_url)?;
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "Using SMTP notifier");
            Arc::new(SmtpNotifier::new(smtp, renderer)?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, emails will only be logged");
            Arc::new(LogNotifier::new(renderer))
        }
    };
    Ok(notifier)
}

/// Picks the sheet mirror for `config`
pub fn build_mirror(config: &WorkerConfig) -> anyhow::Result<Arc<dyn SheetMirror>> {
    let mirror: Arc<dyn SheetMirror> = match &config.mirror {
        Some(mirror) => {
            tracing::info!(endpoint = %mirror.endpoint, "Using HTTP mirror");
            Arc::new(HttpMirror::new(mirror)?)
        }
        None => {
            tracing::warn!("MIRROR_ENDPOINT not set, spreadsheet rows will be dropped");
            Arc::new(DisabledMirror)
        }
    };
    Ok(mirror)
}

pub fn build_dispatcher(pool: PgPool, config: &WorkerConfig) -> anyhow::Result<Dispatcher> {
    Ok(Dispatcher::new(
        OutboxQueue::with_batch_size(pool, config.dispatch.batch_size),
        build_notifier(config)?,
        build_mirror(config)?,
        config.dispatch.clone(),
    ))
}
