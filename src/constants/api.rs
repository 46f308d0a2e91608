//! Constants related to the general configuration of the entire API and its deployment.
use std::{env::var, sync::LazyLock};

/// The socket address the HTTP server binds to.
pub static BIND_ADDRESS: LazyLock<String> =
    LazyLock::new(|| var("BIND_ADDRESS").unwrap_or_else(|_| String::from("0.0.0.0:8080")));

/// Public origin of the web application, used for redirect URLs when the
/// request carries no `Origin` header.
pub static APP_URL: LazyLock<String> =
    LazyLock::new(|| var("APP_URL").unwrap_or_else(|_| String::from("http://localhost:3000")));

/// Timeout applied to every outbound HTTP request, in seconds.
pub static HTTP_TIMEOUT_SECS: LazyLock<u64> = LazyLock::new(|| {
    var("HTTP_TIMEOUT_SECS").map_or(15, |secs| {
        secs.parse()
            .expect("HTTP_TIMEOUT_SECS is not a valid number of seconds")
    })
});
