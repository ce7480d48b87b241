//! Transactional emails for the account and organization flows
//!
//! Templates render to HTML with links back into the API. Delivery goes
//! through Resend; tests use `RecordingEmailSender` (feature `test-util`).

use async_trait::async_trait;
use url::Url;

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const MAX_RETRIES: usize = 3;
/// Delays of 200ms, 400ms, 800ms before jitter
const RETRY_FACTOR_MS: u64 = 100;
const RETRY_MAX_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key. Empty disables delivery.
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// Project name for branding
    pub project_name: String,
    /// Base URL links point at, ending in `/`
    pub api_host_url: Url,
    /// Resend endpoint, overridable for tests
    pub resend_api_url: String,
}

impl EmailConfig {
    pub fn new(resend_api_key: String, email_from: String, project_name: String, api_host_url: Url) -> Self {
        Self {
            resend_api_key,
            email_from,
            project_name,
            api_host_url,
            resend_api_url: RESEND_API_URL.to_string(),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Every email the auth flows send, with the values it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    EmailConfirmation {
        first_name: String,
        otp: String,
    },
    AccountCreated {
        first_name: String,
    },
    OrganizationInvite {
        first_name: String,
        organization_name: String,
        otp: String,
    },
    PasswordReset {
        first_name: String,
        otp: String,
    },
}

/// Subject and HTML body ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

impl EmailTemplate {
    pub fn kind(&self) -> &'static str {
        match self {
            EmailTemplate::EmailConfirmation { .. } => "email_confirmation",
            EmailTemplate::AccountCreated { .. } => "account_created",
            EmailTemplate::OrganizationInvite { .. } => "organization_invite",
            EmailTemplate::PasswordReset { .. } => "password_reset",
        }
    }

    pub fn render(&self, config: &EmailConfig) -> Result<RenderedEmail, EmailError> {
        let project = escape_html(&config.project_name);

        let rendered = match self {
            EmailTemplate::EmailConfirmation { first_name, otp } => {
                let link = otp_link(config, "v1/users/confirm", otp)?;
                RenderedEmail {
                    subject: "Confirm Your Account!".to_string(),
                    html: layout(
                        first_name,
                        &format!("Thanks for signing up to {project}. Confirm your email address to activate your account."),
                        Some((link.as_str(), "Confirm email")),
                    ),
                }
            }
            EmailTemplate::AccountCreated { first_name } => RenderedEmail {
                subject: "Account Created!".to_string(),
                html: layout(
                    first_name,
                    &format!("Your {project} account is ready. Welcome aboard!"),
                    None,
                ),
            },
            EmailTemplate::OrganizationInvite {
                first_name,
                organization_name,
                otp,
            } => {
                let link = otp_link(config, "v1/organizations/accept-invite", otp)?;
                RenderedEmail {
                    subject: "Organization Invite".to_string(),
                    html: layout(
                        first_name,
                        &format!(
                            "You have been invited to join <strong>{}</strong> on {project}.",
                            escape_html(organization_name)
                        ),
                        Some((link.as_str(), "Accept invite")),
                    ),
                }
            }
            EmailTemplate::PasswordReset { first_name, otp } => {
                let link = otp_link(config, "v1/users/set-password-reset-cookie", otp)?;
                RenderedEmail {
                    subject: "Password Reset".to_string(),
                    html: layout(
                        first_name,
                        &format!("We received a request to reset your {project} password. If it wasn't you, ignore this email."),
                        Some((link.as_str(), "Reset password")),
                    ),
                }
            }
        };

        Ok(rendered)
    }
}

fn otp_link(config: &EmailConfig, path: &str, otp: &str) -> Result<String, EmailError> {
    let mut url = config.api_host_url.join(path)?;
    url.query_pairs_mut().append_pair("otp", otp);
    Ok(url.to_string())
}

fn layout(first_name: &str, message: &str, action: Option<(&str, &str)>) -> String {
    let button = action
        .map(|(href, label)| {
            format!(
                r#"<p><a href="{}" style="display: inline-block; padding: 12px 24px; background-color: #f59e0b; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">{label}</a></p>"#,
                escape_html(href)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <p>Hi {},</p>
    <p>{message}</p>
    {button}
</body>
</html>"#,
        escape_html(first_name)
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Outbound email delivery
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, template: EmailTemplate) -> Result<(), EmailError>;
}

/// Sends through the Resend HTTP API, retrying transport failures and 5xx answers
#[derive(Clone)]
pub struct ResendEmailSender {
    config: EmailConfig,
    client: reqwest::Client,
}

impl ResendEmailSender {
    pub fn new(config: EmailConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    async fn post_once(&self, body: &serde_json::Value) -> Result<(), EmailError> {
        let response = self
            .client
            .post(&self.config.resend_api_url)
            .bearer_auth(&self.config.resend_api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(EmailError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, to: &str, template: EmailTemplate) -> Result<(), EmailError> {
        if !self.config.is_enabled() {
            tracing::warn!(kind = template.kind(), "Email not configured, skipping");
            return Ok(());
        }

        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let rendered = template.render(&self.config)?;
        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": rendered.subject,
            "html": rendered.html,
        });

        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(RETRY_FACTOR_MS)
            .max_delay(RETRY_MAX_DELAY)
            .take(MAX_RETRIES)
            .map(jitter);

        let result = Retry::spawn(retry_strategy, || async {
            let result = self.post_once(&body).await;
            match &result {
                Err(e) if e.is_transient() => {
                    tracing::debug!(error = %e, "Transient email failure - will retry");
                    Err(result)
                }
                _ => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e);

        match &result {
            Ok(()) => tracing::info!(kind = template.kind(), "Email sent"),
            Err(e) => tracing::error!(kind = template.kind(), error = %e, "Failed to send email"),
        }
        result
    }
}

/// Keeps every email in memory instead of sending it
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: std::sync::Mutex<Vec<(String, EmailTemplate)>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(recipient, template)` pairs, oldest first
    pub fn sent(&self) -> Vec<(String, EmailTemplate)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &str, template: EmailTemplate) -> Result<(), EmailError> {
        self.sent
            .lock()
            .map_err(|_| EmailError::Unavailable("recorder lock poisoned".to_string()))?
            .push((to.to_string(), template));
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Email provider rejected the message ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("Invalid link: {0}")]
    Url(#[from] url::ParseError),
    #[error("Email delivery unavailable: {0}")]
    Unavailable(String),
}

impl EmailError {
    fn is_transient(&self) -> bool {
        match self {
            EmailError::Http(_) => true,
            EmailError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_url: &str) -> EmailConfig {
        let mut config = EmailConfig::new(
            "re_test_key".into(),
            "Patos <noreply@patos.dev>".into(),
            "patos-app".into(),
            Url::parse("https://api.patos.dev/").unwrap(),
        );
        config.resend_api_url = api_url.to_string();
        config
    }

    #[test]
    fn test_links_point_at_api_with_otp() {
        let config = config(RESEND_API_URL);

        let confirm = EmailTemplate::EmailConfirmation {
            first_name: "Ada".into(),
            otp: "abc-_123".into(),
        }
        .render(&config)
        .unwrap();
        assert_eq!(confirm.subject, "Confirm Your Account!");
        assert!(confirm
            .html
            .contains("https://api.patos.dev/v1/users/confirm?otp=abc-_123"));

        let invite = EmailTemplate::OrganizationInvite {
            first_name: "Ada".into(),
            organization_name: "<Ducks & Co>".into(),
            otp: "xyz".into(),
        }
        .render(&config)
        .unwrap();
        assert!(invite
            .html
            .contains("https://api.patos.dev/v1/organizations/accept-invite?otp=xyz"));
        assert!(invite.html.contains("&lt;Ducks &amp; Co&gt;"));

        let reset = EmailTemplate::PasswordReset {
            first_name: "Ada".into(),
            otp: "r".into(),
        }
        .render(&config)
        .unwrap();
        assert!(reset
            .html
            .contains("https://api.patos.dev/v1/users/set-password-reset-cookie?otp=r"));
    }

    #[tokio::test]
    async fn test_resend_request_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test_key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "from": "Patos <noreply@patos.dev>",
                "to": ["ada@patos.dev"],
                "subject": "Account Created!",
            })))
            .with_status(200)
            .with_body(r#"{"id":"1"}"#)
            .create_async()
            .await;

        let sender = ResendEmailSender::new(config(&format!("{}/emails", server.url())), reqwest::Client::new());
        sender
            .send("ada@patos.dev", EmailTemplate::AccountCreated { first_name: "Ada".into() })
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .with_status(503)
            .expect(MAX_RETRIES + 1)
            .create_async()
            .await;

        let sender = ResendEmailSender::new(config(&format!("{}/emails", server.url())), reqwest::Client::new());
        let result = sender
            .send("ada@patos.dev", EmailTemplate::AccountCreated { first_name: "Ada".into() })
            .await;

        assert!(matches!(result, Err(EmailError::Rejected { status: 503, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body("invalid from")
            .expect(1)
            .create_async()
            .await;

        let sender = ResendEmailSender::new(config(&format!("{}/emails", server.url())), reqwest::Client::new());
        let result = sender
            .send("ada@patos.dev", EmailTemplate::AccountCreated { first_name: "Ada".into() })
            .await;

        assert!(matches!(result, Err(EmailError::Rejected { status: 422, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_sender_skips_delivery() {
        let mut config = config("http://127.0.0.1:9/emails");
        config.resend_api_key.clear();
        let sender = ResendEmailSender::new(config, reqwest::Client::new());

        assert!(sender
            .send("ada@patos.dev", EmailTemplate::AccountCreated { first_name: "Ada".into() })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_recording_sender_keeps_order() {
        let sender = RecordingEmailSender::new();
        sender
            .send("a@x", EmailTemplate::AccountCreated { first_name: "A".into() })
            .await
            .unwrap();
        sender
            .send("b@x", EmailTemplate::AccountCreated { first_name: "B".into() })
            .await
            .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "a@x");
        assert_eq!(sent[1].0, "b@x");
    }
}
