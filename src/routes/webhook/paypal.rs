use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Json, Router};
use serde_json::Value;

use super::paypal_ack;
use crate::{
    services::webhooks::{self, WebhookOutcome},
    state::AppState,
    utils::httperror::HttpError,
};

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(paypal_webhook_event))
}

/// Apply a PayPal delivery. Events that match no payment are still
/// acknowledged so PayPal stops redelivering them.
pub(super) async fn receive(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<Value>, HttpError> {
    let outcome = webhooks::handle_paypal_webhook(
        state.store.as_ref(),
        state.notifier.as_ref(),
        state.verifier.as_ref(),
        headers,
        body,
    )
    .await?;
    if outcome == WebhookOutcome::Unmatched {
        tracing::warn!("Acknowledged PayPal event for an unknown transaction");
    }
    Ok(paypal_ack())
}

async fn paypal_webhook_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, HttpError> {
    receive(&state, &headers, &body).await
}
