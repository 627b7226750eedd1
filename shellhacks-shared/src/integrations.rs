/// Collaborator seams for external services
///
/// - [`Notifier`]: sends templated emails (SMTP in production)
/// - [`SheetMirror`]: appends rows to the organizers' spreadsheet
/// - [`FileStorage`]: uploads resumes and returns a shareable URL
///
/// Notifier and mirror calls are made by the worker while draining the
/// outbox. Resume upload is the one call the lifecycle manager makes inline,
/// because the resulting URL is stored on the applicant.
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::outbox::{NotificationTemplate, Recipient};

/// Uploaded resume, held in memory for the duration of the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ResumeFile {
    /// Extension of the original file name, lower-cased, if any
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Error type for calls to external services
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Request never reached the service or timed out
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service answered with an error
    #[error("Service rejected request: {0}")]
    Rejected(String),

    /// Adapter is not configured for this kind of delivery
    #[error("Delivery disabled: {0}")]
    Disabled(String),

    /// Payload could not be turned into a message
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl DeliveryError {
    /// Whether a later attempt can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transport(_) | DeliveryError::Rejected(_))
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: &Recipient,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait SheetMirror: Send + Sync {
    async fn append_row(
        &self,
        sheet: &str,
        fields: &Map<String, JsonValue>,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores `file` as `name` under `destination` and returns its URL
    async fn upload_file(
        &self,
        file: &ResumeFile,
        name: &str,
        destination: &str,
    ) -> Result<String, DeliveryError>;
}

/// File storage that keeps uploads in memory
///
/// Returns `memory://{destination}/{name}` URLs.
#[derive(Debug, Default)]
pub struct MemoryFileStorage {
    uploads: Mutex<Vec<(String, String, ResumeFile)>>,
    failing: AtomicBool,
}

impl MemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// (destination, name) of every stored upload
    pub async fn uploads(&self) -> Vec<(String, String)> {
        self.uploads
            .lock()
            .await
            .iter()
            .map(|(dest, name, _)| (dest.clone(), name.clone()))
            .collect()
    }
}

#[async_trait]
impl FileStorage for MemoryFileStorage {
    async fn upload_file(
        &self,
        file: &ResumeFile,
        name: &str,
        destination: &str,
    ) -> Result<String, DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("storage offline".to_string()));
        }

        self.uploads
            .lock()
            .await
            .push((destination.to_string(), name.to_string(), file.clone()));
        Ok(format!("memory://{}/{}", destination, name))
    }
}
