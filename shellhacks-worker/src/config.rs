/// Configuration for the side-effect dispatcher
///
/// Loaded from environment variables (and `.env` in development).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
/// - `SMTP_HOST`, `SMTP_PORT` (default 587), `SMTP_USERNAME`, `SMTP_PASSWORD`:
///   SMTP relay; without `SMTP_HOST` emails are only logged
/// - `MAIL_FROM`: Sender mailbox (default: `ShellHacks <no-reply@shellhacks.net>`)
/// - `PORTAL_URL`: Base URL for links in emails (default: `https://shellhacks.net/`)
/// - `MIRROR_ENDPOINT`, `MIRROR_TOKEN`: Spreadsheet/drive bridge; without an
///   endpoint every row is dropped as undeliverable
/// - `MIRROR_TIMEOUT_SECS`: Per-request timeout (default: 10)
/// - `DISPATCH_POLL_INTERVAL_SECS` (default 2), `DISPATCH_BATCH_SIZE` (default 10),
///   `DISPATCH_MAX_ATTEMPTS` (default 8), `DISPATCH_BASE_BACKOFF_SECS` (default 30),
///   `DISPATCH_MAX_BACKOFF_SECS` (default 3600)
/// - `OUTBOX_RETENTION_SECS`: Age at which finished jobs are deleted (default: 7 days)
///
/// # Example
///
/// ```no_run
/// use shellhacks_worker::config::WorkerConfig;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = WorkerConfig::from_env()?;
/// println!("claiming {} jobs per poll", config.dispatch.batch_size);
/// # Ok(())
/// # }
/// ```
use std::env;
use std::str::FromStr;

use crate::dispatcher::DispatcherConfig;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,

    /// `None` selects the log-only notifier
    pub smtp: Option<SmtpConfig>,

    pub portal_url: String,

    /// `None` selects the disabled mirror
    pub mirror: Option<MirrorConfig>,

    pub dispatch: DispatcherConfig,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender mailbox, e.g. `ShellHacks <hello@shellhacks.net>`
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl WorkerConfig {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a numeric variable
    /// does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let from = var("MAIL_FROM")
            .unwrap_or_else(|| "ShellHacks <no-reply@shellhacks.net>".to_string());
        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&var, "SMTP_PORT", 587)?,
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                from,
            }),
            None => None,
        };

        let mirror = match var("MIRROR_ENDPOINT") {
            Some(endpoint) => Some(MirrorConfig {
                endpoint,
                token: var("MIRROR_TOKEN"),
                timeout_secs: parse_or(&var, "MIRROR_TIMEOUT_SECS", 10)?,
            }),
            None => None,
        };

        let defaults = DispatcherConfig::default();
        let dispatch = DispatcherConfig {
            poll_interval_secs: parse_or(&var, "DISPATCH_POLL_INTERVAL_SECS", defaults.poll_interval_secs)?,
            batch_size: parse_or(&var, "DISPATCH_BATCH_SIZE", defaults.batch_size)?,
            max_attempts: parse_or(&var, "DISPATCH_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff_secs: parse_or(&var, "DISPATCH_BASE_BACKOFF_SECS", defaults.base_backoff_secs)?,
            max_backoff_secs: parse_or(&var, "DISPATCH_MAX_BACKOFF_SECS", defaults.max_backoff_secs)?,
            retain_finished_secs: parse_or(&var, "OUTBOX_RETENTION_SECS", defaults.retain_finished_secs)?,
            ..defaults
        };
        if dispatch.batch_size == 0 {
            anyhow::bail!("DISPATCH_BATCH_SIZE must be at least 1");
        }
        if dispatch.max_attempts == 0 {
            anyhow::bail!("DISPATCH_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5)?,
            smtp,
            portal_url: var("PORTAL_URL").unwrap_or_else(|| "https://shellhacks.net/".to_string()),
            mirror,
            dispatch,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        None => Ok(default),
    }
}
