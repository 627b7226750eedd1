/// Plain-text email templates
///
/// Every template addresses the applicant by first name and quotes their
/// shell id. Templates that carry a one-time token also get a link into the
/// applicant portal built from `portal_url`.
use reqwest::Url;
use shellhacks_shared::integrations::DeliveryError;
use shellhacks_shared::outbox::{NotificationTemplate, Recipient};

/// Subject and body of one outgoing email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Renders notification templates against a portal base URL
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    portal_url: Url,
}

impl TemplateRenderer {
    /// # Errors
    ///
    /// Returns `InvalidPayload` if `portal_url` is not an absolute URL.
    pub fn new(portal_url: &str) -> Result<Self, DeliveryError> {
        let portal_url = Url::parse(portal_url)
            .map_err(|e| DeliveryError::InvalidPayload(format!("portal url: {}", e)))?;
        Ok(Self { portal_url })
    }

    pub fn render(
        &self,
        template: NotificationTemplate,
        recipient: &Recipient,
    ) -> Result<RenderedEmail, DeliveryError> {
        let token = match (template.needs_token(), recipient.token.as_deref()) {
            (true, None) => {
                return Err(DeliveryError::InvalidPayload(format!(
                    "{} email without a token",
                    template
                )))
            }
            (_, token) => token.unwrap_or_default(),
        };

        let name = recipient.first_name.trim();
        let greeting = if name.is_empty() {
            "Hi there,".to_string()
        } else {
            format!("Hi {},", name)
        };

        let (subject, middle) = match template {
            NotificationTemplate::Verification => (
                "Confirm your ShellHacks email",
                format!(
                    "Thanks for registering for ShellHacks! Confirm your email by visiting:\n\n{}\n\nYour confirmation code is {}.",
                    self.link("confirm-email", recipient, token)?,
                    token
                ),
            ),
            NotificationTemplate::Applied => (
                "We received your ShellHacks application",
                "Your application is in. We will let you know as soon as decisions go out."
                    .to_string(),
            ),
            NotificationTemplate::AccountConfirmation => (
                "Your ShellHacks email is confirmed",
                "Your email address is confirmed. You can now log in and submit your application."
                    .to_string(),
            ),
            NotificationTemplate::ForgotPassword => (
                "Reset your ShellHacks password",
                format!(
                    "Someone asked to reset your password. If it was you, visit:\n\n{}\n\nYour reset code is {} and expires in 24 hours. If it was not you, ignore this email.",
                    self.link("reset-password", recipient, token)?,
                    token
                ),
            ),
            NotificationTemplate::RemindApply => (
                "Finish your ShellHacks application",
                format!(
                    "You registered for ShellHacks but have not applied yet. Log in to finish your application:\n\n{}",
                    self.page("login")?
                ),
            ),
            NotificationTemplate::RemindConfirm => (
                "Confirm your spot at ShellHacks",
                format!(
                    "You were accepted to ShellHacks! Confirm your attendance so we can save your spot:\n\n{}",
                    self.page("login")?
                ),
            ),
        };

        Ok(RenderedEmail {
            subject: subject.to_string(),
            body: format!(
                "{}\n\n{}\n\nYour shell ID is {}.\n\nThe ShellHacks Team\n",
                greeting, middle, recipient.shell_id
            ),
        })
    }

    fn page(&self, path: &str) -> Result<Url, DeliveryError> {
        self.portal_url
            .join(path)
            .map_err(|e| DeliveryError::InvalidPayload(format!("portal link: {}", e)))
    }

    fn link(&self, path: &str, recipient: &Recipient, token: &str) -> Result<Url, DeliveryError> {
        let mut url = self.page(path)?;
        url.query_pairs_mut()
            .append_pair("email", &recipient.email)
            .append_pair("token", token);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Recipient {
        Recipient {
            email: "ada+hack@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            shell_id: "AB3DE".to_string(),
            token: None,
        }
    }

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new("https://portal.shellhacks.net/").unwrap()
    }

    #[test]
    fn test_verification_includes_link_and_token() {
        let email = renderer()
            .render(
                NotificationTemplate::Verification,
                &ada().with_token("0f3a9c1d2b4e5f60"),
            )
            .unwrap();

        assert_eq!(email.subject, "Confirm your ShellHacks email");
        assert!(email.body.starts_with("Hi Ada,"));
        assert!(email.body.contains(
            "https://portal.shellhacks.net/confirm-email?email=ada%2Bhack%40x.com&token=0f3a9c1d2b4e5f60"
        ));
        assert!(email.body.contains("AB3DE"));
    }

    #[test]
    fn test_token_templates_require_token() {
        let err = renderer()
            .render(NotificationTemplate::ForgotPassword, &ada())
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidPayload(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_every_template_renders() {
        let recipient = ada().with_token("abc123");
        for template in [
            NotificationTemplate::Verification,
            NotificationTemplate::Applied,
            NotificationTemplate::AccountConfirmation,
            NotificationTemplate::ForgotPassword,
            NotificationTemplate::RemindApply,
            NotificationTemplate::RemindConfirm,
        ] {
            let email = renderer().render(template, &recipient).unwrap();
            assert!(!email.subject.is_empty());
            assert!(email.body.contains("AB3DE"), "{} lacks shell id", template);
        }
    }

    #[test]
    fn test_blank_name_greeting() {
        let mut recipient = ada();
        recipient.first_name = "  ".to_string();
        let email = renderer()
            .render(NotificationTemplate::Applied, &recipient)
            .unwrap();
        assert!(email.body.starts_with("Hi there,"));
    }

    #[test]
    fn test_relative_portal_url_rejected() {
        assert!(TemplateRenderer::new("portal.shellhacks.net").is_err());
    }
}
