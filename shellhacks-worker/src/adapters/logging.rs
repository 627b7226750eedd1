/// Notifier that only logs
///
/// Used when no SMTP relay is configured. The rendered email is written at
/// `info` level, which makes local development possible without a mail
/// server. Tokens end up in the log, so never use it in production.
use async_trait::async_trait;
use shellhacks_shared::integrations::{DeliveryError, Notifier};
use shellhacks_shared::outbox::{NotificationTemplate, Recipient};

use super::templates::TemplateRenderer;

pub struct LogNotifier {
    renderer: TemplateRenderer,
}

impl LogNotifier {
    pub fn new(renderer: TemplateRenderer) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        template: NotificationTemplate,
        recipient: &Recipient,
    ) -> Result<(), DeliveryError> {
        let email = self.renderer.render(template, recipient)?;
        tracing::info!(
            to = %recipient.email,
            template = %template,
            subject = %email.subject,
            body = %email.body,
            "Email (log only)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_renders() {
        let notifier = LogNotifier::new(TemplateRenderer::new("http://localhost:3000/").unwrap());
        let recipient = Recipient {
            email: "ada@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            shell_id: "AB3DE".to_string(),
            token: None,
        };

        assert!(notifier.send(NotificationTemplate::Applied, &recipient).await.is_ok());
        assert!(notifier
            .send(NotificationTemplate::Verification, &recipient)
            .await
            .is_err());
    }
}
