//! Webhook API endpoints receiving payment provider notifications. These are
//! called by the providers, never by browsers, so no session is required.
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::{
    db::models::payment::PaymentProvider,
    services::webhooks::{self, errors::WebhookError},
    state::AppState,
    utils::httperror::HttpError,
};

mod mpesa;
mod paypal;

/// Creates a router for all webhook interfaces.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(provider_webhook))
        .nest("/paypal", paypal::create_router())
        .nest("/mpesa", mpesa::create_router())
}

/// Shared endpoint for providers configured with a single callback URL. The
/// provider is named by the `X-Payment-Provider` header.
async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    match webhooks::provider_from_headers(&headers)? {
        PaymentProvider::PayPal => paypal::receive(&state, &headers, &body)
            .await
            .map(IntoResponse::into_response),
        PaymentProvider::Mpesa => mpesa::receive(&state, &headers, &body)
            .await
            .map(IntoResponse::into_response),
        PaymentProvider::Stripe => Err(HttpError::from(StatusCode::BAD_REQUEST)),
    }
}

impl From<WebhookError> for HttpError {
    fn from(error: WebhookError) -> Self {
        match error {
            WebhookError::DatabaseError(err) => err.into(),
            WebhookError::FinalizationError(err) => err.into(),
            WebhookError::Payload(err) => {
                tracing::warn!("Rejected malformed webhook payload: {err}");
                Self::new(
                    StatusCode::BAD_REQUEST,
                    Some(String::from("Malformed webhook payload")),
                )
            }
            WebhookError::MissingHeader(name) => {
                tracing::warn!("Rejected webhook without {name} header");
                Self::validation(name, "Header is required")
            }
            WebhookError::UnknownProvider(provider) => Self::validation(
                webhooks::PROVIDER_HEADER,
                &format!("Unknown payment provider '{provider}'"),
            ),
            WebhookError::ContextMismatch { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                Some(String::from("Capture does not match its payment")),
            ),
            WebhookError::Unverified(reason) => {
                tracing::warn!("Rejected unverified webhook: {reason}");
                Self::from(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

/// Acknowledgement PayPal expects for a delivered event.
fn paypal_ack() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "received": true }))
}

/// Acknowledgement Daraja expects for a delivered callback.
fn mpesa_ack() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ResultCode": 0, "ResultDesc": "Accepted" }))
}
