//! API routes within the application. Each area exposes a sub-router which
//! is nested into the application router by `app`.
pub mod cart;
pub mod checkout;
pub mod mpesa;
pub mod payments;
pub mod webhook;

use axum::{
    http::{header::ORIGIN, HeaderMap},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .nest("/checkout", checkout::create_router(&state))
        .nest("/mpesa", mpesa::create_router(&state))
        .nest("/payments", payments::create_router(&state))
        .nest("/cart", cart::create_router(&state))
        .nest("/webhooks", webhook::create_router());
    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// The origin redirect URLs are built on: the request's `Origin` header when
/// it is a plain http(s) origin, the configured app URL otherwise.
pub(crate) fn request_origin(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .filter(|origin| {
            (origin.starts_with("https://") || origin.starts_with("http://"))
                && !origin.contains(['?', '#', ' '])
        })
        .unwrap_or(state.app_url.as_str())
        .trim_end_matches('/')
        .to_owned()
}
