//! Transactional email constants.
use super::secrets::env_or_secret;
use std::{env::var, sync::LazyLock};

/// API key for the email provider. Without one, notifications are only logged.
pub static MAIL_API_KEY: LazyLock<Option<String>> =
    LazyLock::new(|| env_or_secret("MAIL_API_KEY"));

pub static MAIL_API_URL: LazyLock<String> = LazyLock::new(|| {
    var("MAIL_API_URL").unwrap_or_else(|_| String::from("https://api.resend.com/emails"))
});

pub static MAIL_FROM: LazyLock<String> = LazyLock::new(|| {
    var("MAIL_FROM").unwrap_or_else(|_| String::from("LearnHub <noreply@learnhub.app>"))
});
