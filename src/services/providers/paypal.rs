//! PayPal Orders v2 client. Courses are priced in KES, which PayPal cannot
//! settle, so orders are created in USD.
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{
    errors::ProviderError,
    exchange::{format_usd, kes_minor_to_usd, ExchangeRates},
    read_json,
};
use crate::{
    constants::paypal as constants,
    db::models::payment::PaymentProvider,
};

const PROVIDER: PaymentProvider = PaymentProvider::PayPal;

/// Connection settings for the PayPal REST API.
#[derive(Clone, Debug)]
pub struct PayPalConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub exchange_rate_url: String,
}

impl PayPalConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            api_url: constants::PAYPAL_API_URL.clone(),
            client_id: constants::PAYPAL_CLIENT_ID.clone(),
            client_secret: constants::PAYPAL_CLIENT_SECRET.clone(),
            exchange_rate_url: constants::EXCHANGE_RATE_URL.clone(),
        }
    }
}

/// What is being sold in an order.
pub struct OrderRequest<'a> {
    pub course_id: Uuid,
    pub title: &'a str,
    /// Price in KES minor units.
    pub price_kes: i64,
    pub return_url: &'a str,
    pub cancel_url: &'a str,
}

/// A created PayPal order awaiting buyer approval.
#[derive(Clone, Debug, PartialEq)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    /// Where the buyer approves the payment.
    pub approval_url: String,
    pub usd_amount: String,
    pub kes_per_usd: f64,
}

/// Result of capturing an approved order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayPalCapture {
    pub order_id: String,
    pub status: String,
    pub capture_id: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Deserialize)]
struct PurchaseUnit {
    payments: Option<UnitPayments>,
}

#[derive(Deserialize)]
struct UnitPayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    id: String,
}

/// `custom_id` carried on the purchase unit so webhooks can recover the
/// course and the original KES price without another lookup.
pub fn custom_id(course_id: Uuid, price_kes: i64) -> String {
    format!("{course_id}:{price_kes}")
}

/// Parse a `custom_id` written by `custom_id`.
pub fn parse_custom_id(custom_id: &str) -> Option<(Uuid, i64)> {
    let (course_id, price) = custom_id.split_once(':')?;
    Some((course_id.parse().ok()?, price.parse().ok()?))
}

/// Client for the PayPal REST API.
#[derive(Clone)]
pub struct PayPalClient {
    config: PayPalConfig,
    http: reqwest::Client,
    rates: ExchangeRates,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig, http: reqwest::Client) -> Self {
        let rates = ExchangeRates::new(http.clone(), config.exchange_rate_url.clone());
        Self {
            config,
            http,
            rates,
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.api_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        let token: TokenResponse = read_json(PROVIDER, response).await?;
        Ok(token.access_token)
    }

    /// Create an order for a course, converting its KES price to USD.
    pub async fn create_order(&self, order: OrderRequest<'_>) -> Result<PayPalOrder, ProviderError> {
        let rate = self.rates.kes_per_usd().await;
        let usd_amount = format_usd(kes_minor_to_usd(order.price_kes, rate.kes_per_usd));
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": order.course_id.to_string(),
                "custom_id": custom_id(order.course_id, order.price_kes),
                "description": order.title,
                "amount": { "currency_code": "USD", "value": usd_amount },
            }],
            "application_context": {
                "brand_name": "LearnHub",
                "user_action": "PAY_NOW",
                "shipping_preference": "NO_SHIPPING",
                "return_url": order.return_url,
                "cancel_url": order.cancel_url,
            },
        });
        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.api_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        let created: OrderResponse = read_json(PROVIDER, response).await?;
        let approval_url = created
            .links
            .into_iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href)
            .ok_or(ProviderError::MissingField {
                provider: PROVIDER,
                field: "approve link",
            })?;
        tracing::info!(
            "Created PayPal order {} for course {} ({} USD at {} KES/USD)",
            created.id,
            order.course_id,
            usd_amount,
            rate.kes_per_usd
        );
        Ok(PayPalOrder {
            id: created.id,
            status: created.status,
            approval_url,
            usd_amount,
            kes_per_usd: rate.kes_per_usd,
        })
    }

    /// Capture the funds of an order the buyer has approved.
    pub async fn capture_order(&self, order_id: &str) -> Result<PayPalCapture, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{order_id}/capture",
                self.config.api_url
            ))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        let captured: OrderResponse = read_json(PROVIDER, response).await?;
        let capture_id = captured
            .purchase_units
            .into_iter()
            .filter_map(|unit| unit.payments)
            .flat_map(|payments| payments.captures)
            .map(|capture| capture.id)
            .next();
        Ok(PayPalCapture {
            order_id: captured.id,
            status: captured.status,
            capture_id,
        })
    }

    /// Re-fetch an order and report whether the buyer's payment can be
    /// trusted (`COMPLETED` or `APPROVED`).
    pub async fn validate_order(&self, order_id: &str) -> Result<bool, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/v2/checkout/orders/{order_id}", self.config.api_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        let order: OrderResponse = read_json(PROVIDER, response).await?;
        Ok(matches!(order.status.as_str(), "COMPLETED" | "APPROVED"))
    }
}
