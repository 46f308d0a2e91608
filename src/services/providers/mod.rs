//! Clients for the external payment networks and the services they need.
pub mod exchange;
pub mod mpesa;
pub mod paypal;

use core::time::Duration;

use serde::de::DeserializeOwned;

use crate::db::models::payment::PaymentProvider;

/// Build the HTTP client shared by every outbound integration.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("learnhub-api/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Longest slice of an error body kept for logs.
const MAX_ERROR_BODY: usize = 512;

/// Decode a provider response, turning non-success statuses into
/// `ProviderError::Status`.
async fn read_json<T: DeserializeOwned>(
    provider: PaymentProvider,
    response: reqwest::Response,
) -> Result<T, errors::ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(errors::ProviderError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|source| errors::ProviderError::Http { provider, source })
}

pub mod errors {
    use thiserror::Error;

    use crate::db::models::payment::PaymentProvider;

    /// Failures talking to a payment network.
    #[derive(Debug, Error)]
    pub enum ProviderError {
        /// The request could not be sent or the response not read.
        #[error("request to {provider} failed: {source}")]
        Http {
            provider: PaymentProvider,
            #[source]
            source: reqwest::Error,
        },
        /// The provider answered with a non-success HTTP status.
        #[error("{provider} responded with status {status}: {body}")]
        Status {
            provider: PaymentProvider,
            status: u16,
            body: String,
        },
        /// The provider accepted the HTTP request but declined the operation.
        #[error("{provider} rejected the request: {reason}")]
        Rejected {
            provider: PaymentProvider,
            reason: String,
        },
        /// A field needed to continue was absent from the response.
        #[error("{provider} response was missing {field}")]
        MissingField {
            provider: PaymentProvider,
            field: &'static str,
        },
    }
}
