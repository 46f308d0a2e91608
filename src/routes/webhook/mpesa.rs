use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Json, Router};
use serde_json::Value;

use super::mpesa_ack;
use crate::{
    services::webhooks::{self, WebhookOutcome},
    state::AppState,
    utils::httperror::HttpError,
};

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(mpesa_callback))
}

/// Apply an STK callback. Daraja gets the same acknowledgement whatever the
/// result, as long as the payload could be read.
pub(super) async fn receive(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<Value>, HttpError> {
    let outcome = webhooks::handle_mpesa_webhook(
        state.store.as_ref(),
        state.notifier.as_ref(),
        state.verifier.as_ref(),
        headers,
        body,
    )
    .await?;
    if outcome == WebhookOutcome::Unmatched {
        tracing::warn!("Acknowledged M-PESA callback for an unknown transaction");
    }
    Ok(mpesa_ack())
}

async fn mpesa_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, HttpError> {
    receive(&state, &headers, &body).await
}
