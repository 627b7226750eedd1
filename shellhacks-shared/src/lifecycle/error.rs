use crate::models::applicant::ApplicationStatus;

/// Error type for lifecycle operations
///
/// Infrastructure failures (store, credentials, outbox) collapse into
/// [`LifecycleError::Fatal`] with an opaque message; the detail is logged
/// where it happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("An applicant with this email already exists")]
    DuplicateEmail,

    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("Applicant not found")]
    NotFound,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Cannot move applicant from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Fatal(String),
}

impl LifecycleError {
    pub fn fatal(message: impl Into<String>) -> Self {
        LifecycleError::Fatal(message.into())
    }
}

impl From<crate::validation::ValidationErrors> for LifecycleError {
    fn from(errors: crate::validation::ValidationErrors) -> Self {
        LifecycleError::ValidationFailed(errors.into_reasons())
    }
}
