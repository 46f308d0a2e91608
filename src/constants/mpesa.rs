//! M-PESA (Daraja) related constants.
use super::secrets::env_or_secret;
use std::{env::var, sync::LazyLock};

/// Base URL of the Daraja API. Defaults to the sandbox.
pub static MPESA_API_URL: LazyLock<String> = LazyLock::new(|| {
    var("MPESA_API_URL").unwrap_or_else(|_| String::from("https://sandbox.safaricom.co.ke"))
});

pub static MPESA_CONSUMER_KEY: LazyLock<String> = LazyLock::new(|| {
    var("MPESA_CONSUMER_KEY").expect("MPESA_CONSUMER_KEY not set in environment variables.")
});

pub static MPESA_CONSUMER_SECRET: LazyLock<String> = LazyLock::new(|| {
    env_or_secret("MPESA_CONSUMER_SECRET").expect(
        "Neither MPESA_CONSUMER_SECRET nor MPESA_CONSUMER_SECRET_DOCKER_SECRET provided in environment variables",
    )
});

/// Paybill/till number payments are made to.
pub static MPESA_SHORTCODE: LazyLock<String> = LazyLock::new(|| {
    var("MPESA_SHORTCODE").expect("MPESA_SHORTCODE not set in environment variables.")
});

pub static MPESA_PASSKEY: LazyLock<String> = LazyLock::new(|| {
    env_or_secret("MPESA_PASSKEY").expect(
        "Neither MPESA_PASSKEY nor MPESA_PASSKEY_DOCKER_SECRET provided in environment variables",
    )
});

/// Publicly reachable URL Safaricom posts STK results to.
pub static MPESA_CALLBACK_URL: LazyLock<String> = LazyLock::new(|| {
    var("MPESA_CALLBACK_URL").expect("MPESA_CALLBACK_URL not set in environment variables.")
});
