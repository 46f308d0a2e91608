//! Safaricom Daraja client for Lipa na M-PESA Online (STK push).
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use time::{macros::offset, OffsetDateTime};

use super::{errors::ProviderError, read_json};
use crate::{
    constants::mpesa as constants,
    db::models::payment::PaymentProvider,
    utils::phone::PhoneNumber,
};

const PROVIDER: PaymentProvider = PaymentProvider::Mpesa;

/// Connection settings for the Daraja API.
#[derive(Clone, Debug)]
pub struct MpesaConfig {
    pub api_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
}

impl MpesaConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            api_url: constants::MPESA_API_URL.clone(),
            consumer_key: constants::MPESA_CONSUMER_KEY.clone(),
            consumer_secret: constants::MPESA_CONSUMER_SECRET.clone(),
            shortcode: constants::MPESA_SHORTCODE.clone(),
            passkey: constants::MPESA_PASSKEY.clone(),
            callback_url: constants::MPESA_CALLBACK_URL.clone(),
        }
    }
}

/// Daraja timestamps are `YYYYMMDDHHMMSS` in Nairobi local time.
pub fn timestamp(now: OffsetDateTime) -> String {
    let local = now.to_offset(offset!(+3));
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    )
}

/// The STK password: base64 of shortcode, passkey and timestamp concatenated.
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// Daraja only takes whole shillings. Minor units are rounded up so the
/// payer is never charged less than the price.
pub fn whole_shillings(amount_minor: i64) -> i64 {
    let shillings = amount_minor / 100 + i64::from(amount_minor % 100 > 0);
    shillings.max(1)
}

/// Identifiers Daraja returns for an accepted push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StkPush {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: &'a str,
    transaction_type: &'a str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    response_code: Option<String>,
    response_description: Option<String>,
    customer_message: Option<String>,
}

/// Client for the Daraja API.
#[derive(Clone)]
pub struct MpesaClient {
    config: MpesaConfig,
    http: reqwest::Client,
}

impl MpesaClient {
    pub const fn new(config: MpesaConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Fetch a client-credentials token. Tokens are short lived and fetched
    /// for every push rather than cached.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.api_url
            ))
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        let token: TokenResponse = read_json(PROVIDER, response).await?;
        Ok(token.access_token)
    }

    /// Send a payment prompt to `phone` for `amount_minor` KES minor units.
    pub async fn stk_push(
        &self,
        phone: &PhoneNumber,
        amount_minor: i64,
        account_reference: &str,
        description: &str,
    ) -> Result<StkPush, ProviderError> {
        let token = self.access_token().await?;
        let timestamp = timestamp(OffsetDateTime::now_utc());
        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password: password(&self.config.shortcode, &self.config.passkey, &timestamp),
            timestamp: &timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: whole_shillings(amount_minor),
            party_a: phone.as_str(),
            party_b: &self.config.shortcode,
            phone_number: phone.as_str(),
            callback_url: &self.config.callback_url,
            account_reference,
            transaction_desc: description,
        };
        let response = self
            .http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.api_url
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        let pushed: StkPushResponse = read_json(PROVIDER, response).await?;
        if pushed.response_code.as_deref() != Some("0") {
            return Err(ProviderError::Rejected {
                provider: PROVIDER,
                reason: pushed
                    .response_description
                    .unwrap_or_else(|| String::from("no description")),
            });
        }
        Ok(StkPush {
            merchant_request_id: pushed.merchant_request_id.ok_or(ProviderError::MissingField {
                provider: PROVIDER,
                field: "MerchantRequestID",
            })?,
            checkout_request_id: pushed.checkout_request_id.ok_or(ProviderError::MissingField {
                provider: PROVIDER,
                field: "CheckoutRequestID",
            })?,
            customer_message: pushed.customer_message,
        })
    }
}
