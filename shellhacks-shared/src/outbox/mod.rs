/// Side-effect outbox
///
/// The lifecycle manager never talks to mail servers or spreadsheets
/// directly. It records each follow-up action as a [`SideEffect`] through an
/// [`EffectQueue`]; the worker drains the queue and retries failed deliveries.
/// A request therefore completes as soon as the record store has committed,
/// whatever the state of the external services.
///
/// # Payload format
///
/// Effects are stored as tagged JSON:
///
/// ```json
/// {"kind": "notify", "template": "verification",
///  "recipient": {"email": "ada@x.com", "firstName": "Ada", "lastName": "Lovelace",
///                "shellID": "AB3DE", "token": "0f3a9c1d2b4e5f60"}}
/// {"kind": "append_row", "sheet": "Applicants", "fields": {"shellID": "AB3DE"}}
/// ```
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::models::applicant::Applicant;

pub mod job;
pub mod memory;
pub mod postgres;

pub use job::{JobStatus, OutboxJob};
pub use memory::MemoryEffectQueue;
pub use postgres::PgEffectQueue;

/// Email templates the notifier knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    /// Email confirmation link after registration or resend
    Verification,
    /// Receipt for a submitted application
    Applied,
    /// Email address confirmed
    AccountConfirmation,
    /// Password reset token
    ForgotPassword,
    /// Nudge for registered applicants who have not applied
    RemindApply,
    /// Nudge for accepted applicants who have not confirmed
    RemindConfirm,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTemplate::Verification => "verification",
            NotificationTemplate::Applied => "applied",
            NotificationTemplate::AccountConfirmation => "account_confirmation",
            NotificationTemplate::ForgotPassword => "forgot_password",
            NotificationTemplate::RemindApply => "remind_apply",
            NotificationTemplate::RemindConfirm => "remind_confirm",
        }
    }

    /// Whether the rendered message needs [`Recipient::token`]
    pub fn needs_token(&self) -> bool {
        matches!(
            self,
            NotificationTemplate::Verification | NotificationTemplate::ForgotPassword
        )
    }
}

impl fmt::Display for NotificationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressee of a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "shellID")]
    pub shell_id: String,

    /// Plaintext one-time token, only for templates that carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Recipient {
    pub fn from_applicant(applicant: &Applicant) -> Self {
        Self {
            email: applicant.email.clone(),
            first_name: applicant.first_name.clone(),
            last_name: applicant.last_name.clone(),
            shell_id: applicant.shell_id.clone(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Deferred action against an external collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    Notify {
        template: NotificationTemplate,
        recipient: Recipient,
    },
    AppendRow {
        sheet: String,
        fields: Map<String, JsonValue>,
    },
}

impl SideEffect {
    pub fn notify(template: NotificationTemplate, recipient: Recipient) -> Self {
        SideEffect::Notify {
            template,
            recipient,
        }
    }

    pub fn append_row(sheet: impl Into<String>, fields: Map<String, JsonValue>) -> Self {
        SideEffect::AppendRow {
            sheet: sheet.into(),
            fields,
        }
    }

    /// Value of the `kind` tag, also stored in its own column
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffect::Notify { .. } => "notify",
            SideEffect::AppendRow { .. } => "append_row",
        }
    }
}

/// Error type for outbox operations
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Outbox unavailable: {0}")]
    Unavailable(String),
}

/// Durable queue of side effects
#[async_trait]
pub trait EffectQueue: Send + Sync {
    /// Records an effect for later delivery
    async fn enqueue(&self, effect: SideEffect) -> Result<(), OutboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recipient() -> Recipient {
        Recipient {
            email: "ada@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            shell_id: "AB3DE".to_string(),
            token: None,
        }
    }

    #[test]
    fn test_notify_payload_shape() {
        let effect = SideEffect::notify(
            NotificationTemplate::Verification,
            recipient().with_token("0f3a"),
        );
        let value = serde_json::to_value(&effect).unwrap();

        assert_eq!(value["kind"], "notify");
        assert_eq!(value["template"], "verification");
        assert_eq!(value["recipient"]["shellID"], "AB3DE");
        assert_eq!(value["recipient"]["token"], "0f3a");
        assert_eq!(effect.kind(), "notify");
    }

    #[test]
    fn test_token_omitted_when_absent() {
        let value = serde_json::to_value(SideEffect::notify(
            NotificationTemplate::Applied,
            recipient(),
        ))
        .unwrap();
        assert!(value["recipient"].get("token").is_none());
    }

    #[test]
    fn test_append_row_parses() {
        let effect: SideEffect = serde_json::from_value(json!({
            "kind": "append_row",
            "sheet": "Applicants",
            "fields": {"shellID": "AB3DE"}
        }))
        .unwrap();

        match effect {
            SideEffect::AppendRow { sheet, fields } => {
                assert_eq!(sheet, "Applicants");
                assert_eq!(fields["shellID"], "AB3DE");
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_template_token_requirements() {
        assert!(NotificationTemplate::Verification.needs_token());
        assert!(NotificationTemplate::ForgotPassword.needs_token());
        assert!(!NotificationTemplate::RemindApply.needs_token());
    }
}
