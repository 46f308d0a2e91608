//! Enrollment notifications sent once a purchase is finalized.
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::{constants::mail as constants, utils::email::EmailAddress};

/// Escape text for interpolation into HTML element content or attributes.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Everything needed to tell a user they have been enrolled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrollmentNotice {
    pub email: EmailAddress,
    pub name: Option<String>,
    pub course_id: Uuid,
    pub course_title: String,
}

impl EnrollmentNotice {
    fn subject(&self) -> String {
        format!("You're enrolled in {}", self.course_title)
    }
    fn html(&self, app_url: &str) -> String {
        let greeting = self
            .name
            .as_deref()
            .map_or_else(
                || String::from("Hi there"),
                |name| format!("Hi {}", escape_html(name)),
            );
        format!(
            "<p>{greeting},</p><p>Your enrollment in <strong>{}</strong> is confirmed.</p>\
            <p><a href=\"{}/dashboard/courses/{}\">Start learning</a></p>",
            escape_html(&self.course_title),
            escape_html(app_url),
            self.course_id
        )
    }
}

/// Delivers user-facing notifications. Delivery is best effort: callers log
/// failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn enrollment(&self, notice: &EnrollmentNotice) -> Result<(), errors::NotificationError>;
}

/// Notifier that only records notices in the log. Used when no email
/// provider is configured.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn enrollment(&self, notice: &EnrollmentNotice) -> Result<(), errors::NotificationError> {
        tracing::info!(
            "Enrollment email for {} to {} (delivery disabled)",
            notice.course_id,
            notice.email.as_str()
        );
        Ok(())
    }
}

/// Settings for the transactional email API.
#[derive(Clone, Debug)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    /// Public origin used for links inside emails.
    pub app_url: String,
}

impl MailerConfig {
    /// Read the configuration from the environment. `None` when no API key
    /// is configured.
    pub fn from_env() -> Option<Self> {
        constants::MAIL_API_KEY.clone().map(|api_key| Self {
            api_url: constants::MAIL_API_URL.clone(),
            api_key,
            from: constants::MAIL_FROM.clone(),
            app_url: crate::constants::api::APP_URL.clone(),
        })
    }
}

/// Sends email through a JSON email API (`{ from, to, subject, html }`).
pub struct HttpMailer {
    config: MailerConfig,
    http: reqwest::Client,
}

impl HttpMailer {
    pub const fn new(config: MailerConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn enrollment(&self, notice: &EnrollmentNotice) -> Result<(), errors::NotificationError> {
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "from": self.config.from,
                "to": [notice.email.as_str()],
                "subject": notice.subject(),
                "html": notice.html(&self.config.app_url),
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(errors::NotificationError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum NotificationError {
        #[error(transparent)]
        Http(#[from] reqwest::Error),
        #[error("Email API responded with status {0}")]
        Rejected(u16),
    }
}

#[cfg(test)]
mod tests {
    use super::{EnrollmentNotice, HttpMailer, MailerConfig, Notifier};
    use crate::utils::email::EmailAddress;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::{
        matchers::{body_partial_json, header, method},
        Mock, MockServer, ResponseTemplate,
    };

    fn notice() -> EnrollmentNotice {
        EnrollmentNotice {
            email: EmailAddress::try_from("wanjiru@example.com").expect("valid email"),
            name: Some(String::from("Wanjiru")),
            course_id: Uuid::nil(),
            course_title: String::from("Intro to Rust"),
        }
    }

    fn mailer(server: &MockServer) -> HttpMailer {
        HttpMailer::new(
            MailerConfig {
                api_url: format!("{}/emails", server.uri()),
                api_key: String::from("re_test"),
                from: String::from("LearnHub <noreply@learnhub.test>"),
                app_url: String::from("https://learnhub.test"),
            },
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn posts_enrollment_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({
                "to": ["wanjiru@example.com"],
                "subject": "You're enrolled in Intro to Rust",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "email_1" })))
            .expect(1)
            .mount(&server)
            .await;
        mailer(&server)
            .enrollment(&notice())
            .await
            .expect("email accepted");
    }

    #[test]
    fn user_supplied_text_is_escaped() {
        let notice = EnrollmentNotice {
            name: Some(String::from("<script>alert(1)</script>")),
            course_title: String::from("Rust & \"Axum\" <advanced>"),
            ..notice()
        };
        let html = notice.html("https://learnhub.test");
        assert!(html.contains("Hi &lt;script&gt;alert(1)&lt;/script&gt;,"));
        assert!(html.contains("<strong>Rust &amp; &quot;Axum&quot; &lt;advanced&gt;</strong>"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn rejected_email_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;
        assert!(mailer(&server).enrollment(&notice()).await.is_err());
    }
}
