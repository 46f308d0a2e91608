//! Defines the state shared across the Axum application.
use std::sync::Arc;

use crate::{
    db::store::Store,
    services::{
        notifications::Notifier,
        providers::{mpesa::MpesaClient, paypal::PayPalClient},
        sessions::SessionStore,
        webhooks::WebhookVerifier,
    },
};

#[derive(Clone)]
/// The state struct shared across routers.
pub struct AppState {
    /// Course, purchase and payment storage.
    pub store: Arc<dyn Store>,
    /// Resolves session cookies issued by the auth service.
    pub session_store: Arc<dyn SessionStore>,
    pub paypal: PayPalClient,
    pub mpesa: MpesaClient,
    pub notifier: Arc<dyn Notifier>,
    /// Checks provider webhook signatures.
    pub verifier: Arc<dyn WebhookVerifier>,
    /// Public origin used when a request carries no `Origin` header.
    pub app_url: String,
}
