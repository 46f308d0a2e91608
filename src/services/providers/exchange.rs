//! KES to USD conversion for providers that cannot charge in KES.
use serde::Deserialize;

use crate::constants::checkout::FALLBACK_KES_PER_USD;

/// Where a conversion rate came from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rate {
    /// How many KES buy one USD.
    pub kes_per_usd: f64,
    /// Whether the lookup failed and the fixed fallback was used.
    pub fallback: bool,
}

#[derive(Deserialize)]
struct RatesResponse {
    rates: RatesTable,
}

#[derive(Deserialize)]
struct RatesTable {
    #[serde(rename = "USD")]
    usd: Option<f64>,
}

/// Exchange-rate lookup against a KES based rates endpoint.
#[derive(Clone)]
pub struct ExchangeRates {
    http: reqwest::Client,
    url: String,
}

impl ExchangeRates {
    pub const fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    async fn lookup(&self) -> Result<f64, String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        let body: RatesResponse = response.json().await.map_err(|err| err.to_string())?;
        match body.rates.usd {
            Some(usd_per_kes) if usd_per_kes.is_finite() && usd_per_kes > 0.0 => {
                Ok(1.0 / usd_per_kes)
            }
            other => Err(format!("unusable USD rate {other:?}")),
        }
    }

    /// The current KES/USD rate. Never fails: an unavailable lookup falls
    /// back to `FALLBACK_KES_PER_USD` so checkout keeps working.
    pub async fn kes_per_usd(&self) -> Rate {
        match self.lookup().await {
            Ok(kes_per_usd) => Rate {
                kes_per_usd,
                fallback: false,
            },
            Err(reason) => {
                tracing::warn!(
                    "Exchange rate lookup failed ({reason}), using fallback of {FALLBACK_KES_PER_USD} KES/USD"
                );
                Rate {
                    kes_per_usd: FALLBACK_KES_PER_USD,
                    fallback: true,
                }
            }
        }
    }
}

/// Smallest amount PayPal accepts.
const MIN_USD: f64 = 0.01;

/// Convert an amount in KES minor units to USD, rounded to cents. Positive
/// amounts never round down to zero.
pub fn kes_minor_to_usd(amount_minor: i64, kes_per_usd: f64) -> f64 {
    #[expect(clippy::cast_precision_loss, reason = "course prices are far below 2^52")]
    let kes = amount_minor as f64 / 100.0;
    let usd = (kes / kes_per_usd * 100.0).round() / 100.0;
    if amount_minor > 0 {
        usd.max(MIN_USD)
    } else {
        usd
    }
}

/// Format a USD amount the way PayPal expects it.
pub fn format_usd(amount: f64) -> String {
    format!("{amount:.2}")
}

#[cfg(test)]
mod tests {
    use super::{format_usd, kes_minor_to_usd, ExchangeRates};
    use crate::constants::checkout::FALLBACK_KES_PER_USD;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn fallback_conversion_rounds_to_cents() {
        let usd = kes_minor_to_usd(150_000, FALLBACK_KES_PER_USD);
        assert_eq!(format_usd(usd), "11.54");
        assert_eq!(format_usd(kes_minor_to_usd(1_300_000, 130.0)), "100.00");
        assert_eq!(format_usd(kes_minor_to_usd(99, 130.0)), "0.01");
    }

    #[test]
    fn tiny_prices_are_charged_the_minimum() {
        assert_eq!(format_usd(kes_minor_to_usd(50, FALLBACK_KES_PER_USD)), "0.01");
        assert_eq!(format_usd(kes_minor_to_usd(1, FALLBACK_KES_PER_USD)), "0.01");
    }

    #[tokio::test]
    async fn uses_looked_up_rate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest/KES"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "rates": { "USD": 0.008, "KES": 1.0 } })),
            )
            .mount(&server)
            .await;
        let rates = ExchangeRates::new(reqwest::Client::new(), format!("{}/latest/KES", server.uri()));
        let rate = rates.kes_per_usd().await;
        assert!(!rate.fallback);
        assert!((rate.kes_per_usd - 125.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn falls_back_when_lookup_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let rates = ExchangeRates::new(reqwest::Client::new(), server.uri());
        let rate = rates.kes_per_usd().await;
        assert!(rate.fallback);
        assert!((rate.kes_per_usd - FALLBACK_KES_PER_USD).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn falls_back_on_missing_usd_rate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "rates": {} })),
            )
            .mount(&server)
            .await;
        let rates = ExchangeRates::new(reqwest::Client::new(), server.uri());
        assert!(rates.kes_per_usd().await.fallback);
    }
}
