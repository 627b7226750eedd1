/// Outbox dispatcher
///
/// Drains `outbox_jobs`: claims due jobs, delivers each one on its own tokio
/// task through the notifier or the sheet mirror, and records the outcome.
///
/// # Architecture
///
/// ```text
/// Dispatcher
///   ├─> OutboxQueue: claim due pending jobs (SKIP LOCKED)
///   ├─> Notifier:    Notify effects
///   ├─> SheetMirror: AppendRow effects
///   └─> OutboxQueue: delivered / retry later / failed
/// ```
///
/// # Retries
///
/// A retryable failure puts the job back to `pending` with
/// `next_attempt_at = now + base * 2^(attempts - 1)`, capped at
/// `max_backoff_secs`. After `max_attempts` attempts, or on a permanent
/// error, the job is marked `failed` and left for inspection.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use shellhacks_worker::adapters::{DisabledMirror, LogNotifier, TemplateRenderer};
/// use shellhacks_worker::dispatcher::{Dispatcher, DispatcherConfig};
/// use shellhacks_worker::queue::OutboxQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let renderer = TemplateRenderer::new("https://shellhacks.net/")?;
/// let dispatcher = Dispatcher::new(
///     OutboxQueue::new(pool),
///     Arc::new(LogNotifier::new(renderer)),
///     Arc::new(DisabledMirror),
///     DispatcherConfig::default(),
/// );
///
/// let shutdown = dispatcher.shutdown_token();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.cancel();
/// });
/// dispatcher.run().await;
/// # Ok(())
/// # }
/// ```
use chrono::Utc;
use shellhacks_shared::integrations::{DeliveryError, Notifier, SheetMirror};
use shellhacks_shared::outbox::{OutboxJob, SideEffect};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::queue::OutboxQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Idle wait between polls
    pub poll_interval_secs: u64,

    /// Jobs claimed per poll
    pub batch_size: usize,

    /// Deliveries in flight at once
    pub max_concurrent_jobs: usize,

    /// Attempts before a job is marked failed
    pub max_attempts: u32,

    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,

    /// `running` jobs older than this are handed back to `pending`
    pub stale_after_secs: u64,

    /// Finished jobs older than this are deleted
    pub retain_finished_secs: u64,

    /// How long shutdown waits for in-flight deliveries
    pub shutdown_grace_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            poll_interval_secs: 2,
            batch_size: 10,
            max_concurrent_jobs: 10,
            max_attempts: 8,
            base_backoff_secs: 30,
            max_backoff_secs: 3600,
            stale_after_secs: 600,
            retain_finished_secs: 7 * 24 * 3600,
            shutdown_grace_secs: 30,
        }
    }
}

impl DispatcherConfig {
    /// Delay before the next attempt, given the attempts made so far
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let secs = self
            .base_backoff_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }
}

/// What happens to a job after one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Delivered,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

impl Disposition {
    /// `attempts` includes the attempt that produced `result`
    pub fn decide(result: Result<(), DeliveryError>, attempts: u32, config: &DispatcherConfig) -> Self {
        match result {
            Ok(()) => Disposition::Delivered,
            Err(e) if e.is_retryable() && attempts < config.max_attempts => Disposition::Retry {
                delay: config.retry_delay(attempts),
                error: e.to_string(),
            },
            Err(e) => Disposition::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Performs one side effect against the matching collaborator
pub async fn deliver(
    effect: &SideEffect,
    notifier: &dyn Notifier,
    mirror: &dyn SheetMirror,
) -> Result<(), DeliveryError> {
    match effect {
        SideEffect::Notify {
            template,
            recipient,
        } => notifier.send(*template, recipient).await,
        SideEffect::AppendRow { sheet, fields } => mirror.append_row(sheet, fields).await,
    }
}

/// Decodes and delivers a claimed job, returning what should happen to it
pub async fn attempt(
    job: &OutboxJob,
    notifier: &dyn Notifier,
    mirror: &dyn SheetMirror,
    config: &DispatcherConfig,
) -> Disposition {
    let result = match job.effect() {
        Ok(effect) => deliver(&effect, notifier, mirror).await,
        Err(e) => Err(DeliveryError::InvalidPayload(e.to_string())),
    };
    Disposition::decide(result, job.attempts.max(0) as u32, config)
}

pub struct Dispatcher {
    queue: OutboxQueue,
    notifier: Arc<dyn Notifier>,
    mirror: Arc<dyn SheetMirror>,
    config: DispatcherConfig,
    shutdown_token: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        queue: OutboxQueue,
        notifier: Arc<dyn Notifier>,
        mirror: Arc<dyn SheetMirror>,
        config: DispatcherConfig,
    ) -> Self {
        Dispatcher {
            queue,
            notifier,
            mirror,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Cancelling this token stops the loop after in-flight deliveries finish
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs until the shutdown token is cancelled
    ///
    /// Queue errors are logged and retried after the poll interval; they
    /// never end the loop.
    pub async fn run(&self) {
        tracing::info!(
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "Dispatcher starting"
        );

        let slots = self.config.max_concurrent_jobs.max(1);
        let permits = Arc::new(Semaphore::new(slots));
        let poll = Duration::from_secs(self.config.poll_interval_secs);
        let sweep_every = Duration::from_secs(self.config.stale_after_secs.max(1));
        let mut last_sweep: Option<Instant> = None;

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            if last_sweep.map_or(true, |at| at.elapsed() >= sweep_every) {
                if let Err(e) = self.queue.release_stale(self.config.stale_after_secs).await {
                    tracing::error!(error = %e, "Failed to release stale jobs");
                }
                if let Err(e) = self.queue.purge_finished(self.config.retain_finished_secs).await {
                    tracing::error!(error = %e, "Failed to purge finished jobs");
                }
                last_sweep = Some(Instant::now());
            }

            let available = permits.available_permits().min(self.config.batch_size);
            if available == 0 {
                self.pause(Duration::from_millis(100)).await;
                continue;
            }

            let jobs = match self.queue.claim_jobs(Some(available)).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim outbox jobs");
                    self.pause(poll).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                self.pause(poll).await;
                continue;
            }

            for job in jobs {
                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let queue = self.queue.clone();
                let notifier = Arc::clone(&self.notifier);
                let mirror = Arc::clone(&self.mirror);
                let config = self.config.clone();

                tokio::spawn(async move {
                    process_job(job, &queue, notifier.as_ref(), mirror.as_ref(), &config).await;
                    drop(permit);
                });
            }
        }

        tracing::info!("Shutdown requested, waiting for in-flight deliveries");
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        match timeout(grace, permits.acquire_many(slots as u32)).await {
            Ok(_) => tracing::info!("Dispatcher shut down"),
            Err(_) => tracing::warn!(
                in_flight = slots - permits.available_permits(),
                "Dispatcher shut down with deliveries still running"
            ),
        };
    }

    /// Sleeps unless shutdown is requested first
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.shutdown_token.cancelled() => {}
            _ = sleep(duration) => {}
        }
    }
}

async fn process_job(
    job: OutboxJob,
    queue: &OutboxQueue,
    notifier: &dyn Notifier,
    mirror: &dyn SheetMirror,
    config: &DispatcherConfig,
) {
    let disposition = attempt(&job, notifier, mirror, config).await;

    let recorded = match &disposition {
        Disposition::Delivered => {
            tracing::info!(job_id = %job.id, kind = %job.kind, attempts = job.attempts, "Outbox job delivered");
            queue.mark_delivered(job.id).await
        }
        Disposition::Retry { delay, error } => {
            tracing::warn!(
                job_id = %job.id,
                kind = %job.kind,
                attempts = job.attempts,
                retry_in_secs = delay.as_secs(),
                error = %error,
                "Outbox delivery failed, will retry"
            );
            let next = Utc::now()
                + chrono::Duration::from_std(*delay).unwrap_or_else(|_| chrono::Duration::hours(1));
            queue.schedule_retry(job.id, next, error).await
        }
        Disposition::Failed { error } => queue.mark_failed(job.id, error).await,
    };

    if let Err(e) = recorded {
        tracing::error!(job_id = %job.id, error = %e, "Failed to record delivery outcome");
    }
}
