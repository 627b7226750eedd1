/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `API_PRODUCTION`: Enables HSTS (default: false)
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for any (default: `*`)
/// - `JWT_SECRET`: Secret key for session tokens (required, at least 32 characters)
/// - `DASHBOARD_PASSWORD`: Bearer secret for admin routes (required)
/// - `MIRROR_ENABLED`: Queue spreadsheet rows (default: false)
/// - `DRIVE_UPLOAD_ENABLED`: Upload resumes (default: false)
/// - `GOOGLE_FOLDER_ID`: Resume destination folder
/// - `RESET_TOKEN_TTL_HOURS`: Password reset token lifetime, at most a year (default: 24)
/// - `CONFIRM_TOKEN_BYTES`: Email confirmation token size (default: 8)
/// - `TRANSITION_POLICY`: `strict` or `lenient` (default: strict)
/// - `VALIDATION_RULES_PATH`: Rules file (TOML/JSON/YAML); defaults when unset
/// - `MIRROR_ENDPOINT`, `MIRROR_TOKEN`: Bridge used for resume uploads
/// - `EMBEDDED_DISPATCHER`: Run the outbox dispatcher in-process (default: false)
///
/// # Example
///
/// ```no_run
/// use shellhacks_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```
use chrono::Duration;
use shellhacks_shared::lifecycle::{LifecycleConfig, TransitionPolicy};
use shellhacks_worker::config::MirrorConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Upper bound for `RESET_TOKEN_TTL_HOURS` (one year)
const MAX_RESET_TOKEN_TTL_HOURS: i64 = 8760;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub admin: AdminConfig,
    pub features: FeatureConfig,

    /// Rules file; `None` uses the built-in rules
    pub validation_rules_path: Option<PathBuf>,

    /// Bridge for resume uploads; `None` disables uploads
    pub mirror: Option<MirrorConfig>,

    /// Run the outbox dispatcher inside the API process
    pub embedded_dispatcher: bool,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Enables HSTS
    pub production: bool,

    /// Allowed origins; `*` allows any
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for session token signing
    ///
    /// Must be kept secret and at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Bearer secret expected on `/v1/admin` routes
    pub dashboard_password: String,
}

/// Switches and knobs forwarded to the lifecycle manager
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub mirror_enabled: bool,
    pub drive_upload_enabled: bool,
    pub resume_folder: String,
    pub reset_token_ttl_hours: i64,
    pub confirm_token_bytes: usize,
    pub transition_policy: TransitionPolicy,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let dashboard_password = var("DASHBOARD_PASSWORD")
            .ok_or_else(|| anyhow::anyhow!("DASHBOARD_PASSWORD environment variable is required"))?;

        let cors_origins = var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let transition_policy = match var("TRANSITION_POLICY") {
            Some(raw) => TransitionPolicy::from_str(&raw).map_err(|e| anyhow::anyhow!(e))?,
            None => TransitionPolicy::default(),
        };

        let confirm_token_bytes: usize = parse_or(&var, "CONFIRM_TOKEN_BYTES", 8)?;
        if confirm_token_bytes == 0 {
            anyhow::bail!("CONFIRM_TOKEN_BYTES must be at least 1");
        }
        let reset_token_ttl_hours: i64 = parse_or(&var, "RESET_TOKEN_TTL_HOURS", 24)?;
        if !(1..=MAX_RESET_TOKEN_TTL_HOURS).contains(&reset_token_ttl_hours) {
            anyhow::bail!(
                "RESET_TOKEN_TTL_HOURS must be between 1 and {}",
                MAX_RESET_TOKEN_TTL_HOURS
            );
        }

        let mirror = match var("MIRROR_ENDPOINT") {
            Some(endpoint) => Some(MirrorConfig {
                endpoint,
                token: var("MIRROR_TOKEN"),
                timeout_secs: parse_or(&var, "MIRROR_TIMEOUT_SECS", 10)?,
            }),
            None => None,
        };

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "API_PORT", 8080)?,
                production: parse_or(&var, "API_PRODUCTION", false)?,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            admin: AdminConfig { dashboard_password },
            features: FeatureConfig {
                mirror_enabled: parse_or(&var, "MIRROR_ENABLED", false)?,
                drive_upload_enabled: parse_or(&var, "DRIVE_UPLOAD_ENABLED", false)?,
                resume_folder: var("GOOGLE_FOLDER_ID").unwrap_or_default(),
                reset_token_ttl_hours,
                confirm_token_bytes,
                transition_policy,
            },
            validation_rules_path: var("VALIDATION_RULES_PATH").map(PathBuf::from),
            mirror,
            embedded_dispatcher: parse_or(&var, "EMBEDDED_DISPATCHER", false)?,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Lifecycle settings derived from the feature switches
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            mirror_enabled: self.features.mirror_enabled,
            drive_upload_enabled: self.features.drive_upload_enabled,
            resume_folder: self.features.resume_folder.clone(),
            reset_token_ttl: Duration::hours(self.features.reset_token_ttl_hours),
            confirm_token_bytes: self.features.confirm_token_bytes,
            transition_policy: self.features.transition_policy,
            ..LifecycleConfig::default()
        }
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
            .to_ascii_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        None => Ok(default),
    }
}
