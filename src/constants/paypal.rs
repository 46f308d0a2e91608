//! PayPal related constants.
use super::secrets::env_or_secret;
use std::{env::var, sync::LazyLock};

/// Base URL of the PayPal REST API. Defaults to the sandbox.
pub static PAYPAL_API_URL: LazyLock<String> = LazyLock::new(|| {
    var("PAYPAL_API_URL").unwrap_or_else(|_| String::from("https://api-m.sandbox.paypal.com"))
});

pub static PAYPAL_CLIENT_ID: LazyLock<String> = LazyLock::new(|| {
    var("PAYPAL_CLIENT_ID").expect("PAYPAL_CLIENT_ID not set in environment variables.")
});

pub static PAYPAL_CLIENT_SECRET: LazyLock<String> = LazyLock::new(|| {
    env_or_secret("PAYPAL_CLIENT_SECRET").expect(
        "Neither PAYPAL_CLIENT_SECRET nor PAYPAL_CLIENT_SECRET_DOCKER_SECRET provided in environment variables",
    )
});

/// Endpoint returning exchange rates relative to KES.
pub static EXCHANGE_RATE_URL: LazyLock<String> = LazyLock::new(|| {
    var("EXCHANGE_RATE_URL")
        .unwrap_or_else(|_| String::from("https://open.er-api.com/v6/latest/KES"))
});
