/// SMTP notifier
///
/// Sends the rendered plain-text templates through a STARTTLS relay with
/// `lettre`'s async transport.
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use shellhacks_shared::integrations::{DeliveryError, Notifier};
use shellhacks_shared::outbox::{NotificationTemplate, Recipient};
use thiserror::Error;

use super::templates::TemplateRenderer;
use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum SmtpSetupError {
    #[error("SMTP error: {0}")]
    Relay(#[from] SmtpError),

    #[error("Invalid sender address: {0}")]
    InvalidFrom(String),
}

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    renderer: TemplateRenderer,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig, renderer: TemplateRenderer) -> Result<Self, SmtpSetupError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|_| SmtpSetupError::InvalidFrom(config.from.clone()))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            renderer,
        })
    }
}

/// Permanent (5xx) rejections will not succeed on retry
fn classify(e: SmtpError) -> DeliveryError {
    if e.is_permanent() {
        DeliveryError::InvalidPayload(format!("permanent SMTP rejection: {}", e))
    } else if e.is_transient() {
        DeliveryError::Rejected(e.to_string())
    } else {
        DeliveryError::Transport(e.to_string())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: &Recipient,
    ) -> Result<(), DeliveryError> {
        let email = self.renderer.render(template, recipient)?;

        let to = recipient
            .email
            .parse::<Mailbox>()
            .map_err(|_| DeliveryError::InvalidPayload(format!("bad address {}", recipient.email)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| DeliveryError::InvalidPayload(e.to_string()))?;

        self.mailer.send(message).await.map_err(classify)?;

        tracing::info!(
            to = %recipient.email,
            template = %template,
            "Email sent"
        );
        Ok(())
    }
}
