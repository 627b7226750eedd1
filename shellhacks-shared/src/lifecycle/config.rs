use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How strictly attendance and submission transitions are guarded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Only transitions on the lifecycle graph are allowed
    #[default]
    Strict,

    /// Confirm/unconfirm and re-submission from any status
    Lenient,
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(TransitionPolicy::Strict),
            "lenient" => Ok(TransitionPolicy::Lenient),
            other => Err(format!("Unknown transition policy: {}", other)),
        }
    }
}

/// Token bucket settings for resend-confirmation and forgot-password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Burst size per email
    pub capacity: u32,

    /// Tokens returned to each bucket per minute
    pub refill_per_minute: u32,

    /// Emails tracked at once before the fullest buckets are evicted
    pub max_keys: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            refill_per_minute: 1,
            max_keys: 4096,
        }
    }
}

/// Settings for [`super::ApplicantLifecycle`]
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Queue spreadsheet rows on submission and confirmation
    pub mirror_enabled: bool,

    /// Upload resumes; otherwise the placeholder is stored
    pub drive_upload_enabled: bool,

    /// Folder (or bucket prefix) resumes are uploaded to
    pub resume_folder: String,

    pub reset_token_ttl: Duration,
    pub confirm_token_bytes: usize,
    pub reset_token_bytes: usize,
    pub credential_ttl: Duration,
    pub shell_id_length: usize,
    pub shell_id_max_attempts: u32,
    pub transition_policy: TransitionPolicy,
    pub throttle: ThrottleConfig,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            mirror_enabled: false,
            drive_upload_enabled: false,
            resume_folder: String::new(),
            reset_token_ttl: Duration::hours(24),
            confirm_token_bytes: 8,
            reset_token_bytes: 6,
            credential_ttl: Duration::days(6),
            shell_id_length: 5,
            shell_id_max_attempts: 10,
            transition_policy: TransitionPolicy::Strict,
            throttle: ThrottleConfig::default(),
            default_page_size: 30,
            max_page_size: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.reset_token_ttl, Duration::hours(24));
        assert_eq!(config.credential_ttl, Duration::seconds(60 * 60 * 144));
        assert_eq!(config.shell_id_length, 5);
        assert_eq!(config.transition_policy, TransitionPolicy::Strict);
        assert_eq!(config.default_page_size, 30);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("LENIENT".parse::<TransitionPolicy>(), Ok(TransitionPolicy::Lenient));
        assert_eq!(" strict ".parse::<TransitionPolicy>(), Ok(TransitionPolicy::Strict));
        assert!("loose".parse::<TransitionPolicy>().is_err());
    }
}
