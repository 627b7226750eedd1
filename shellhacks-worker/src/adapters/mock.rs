/// Recording doubles for the delivery seams
///
/// Both doubles remember every call and can be scripted to fail, which is
/// how the dispatcher's retry handling is exercised without a mail server
/// or a spreadsheet.
///
/// # Example
///
/// ```no_run
/// use shellhacks_shared::integrations::DeliveryError;
/// use shellhacks_worker::adapters::RecordingNotifier;
///
/// # async fn example() {
/// let notifier = RecordingNotifier::new();
/// notifier
///     .fail_next(DeliveryError::Transport("connection reset".into()))
///     .await;
/// # }
/// ```
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use shellhacks_shared::integrations::{DeliveryError, Notifier, SheetMirror};
use shellhacks_shared::outbox::{NotificationTemplate, Recipient};
use std::collections::VecDeque;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(NotificationTemplate, Recipient)>>,
    failures: Mutex<VecDeque<DeliveryError>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `send` fail with `error`
    pub async fn fail_next(&self, error: DeliveryError) {
        self.failures.lock().await.push_back(error);
    }

    /// Successfully sent notifications
    pub async fn sent(&self) -> Vec<(NotificationTemplate, Recipient)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: &Recipient,
    ) -> Result<(), DeliveryError> {
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        self.sent.lock().await.push((template, recipient.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingMirror {
    rows: Mutex<Vec<(String, Map<String, JsonValue>)>>,
    failures: Mutex<VecDeque<DeliveryError>>,
}

impl RecordingMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next(&self, error: DeliveryError) {
        self.failures.lock().await.push_back(error);
    }

    pub async fn rows(&self) -> Vec<(String, Map<String, JsonValue>)> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl SheetMirror for RecordingMirror {
    async fn append_row(
        &self,
        sheet: &str,
        fields: &Map<String, JsonValue>,
    ) -> Result<(), DeliveryError> {
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        self.rows.lock().await.push((sheet.to_string(), fields.clone()));
        Ok(())
    }
}
