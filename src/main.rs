use std::sync::Arc;

use learnhub_api::{
    constants::{api, db::STORE_BACKEND},
    db::{self, memory::MemoryStore, store::PgStore, store::Store},
    routes,
    services::{
        notifications::{HttpMailer, LogNotifier, MailerConfig, Notifier},
        providers::{
            build_http_client,
            mpesa::{MpesaClient, MpesaConfig},
            paypal::{PayPalClient, PayPalConfig},
        },
        sessions::{self, MemorySessionStore, SessionStore},
        webhooks::AcceptAllVerifier,
    },
    state::AppState,
};
use tracing_subscriber::EnvFilter;

/// Storage and session backends for the configured `LEARNHUB_STORE`.
async fn backends() -> (Arc<dyn Store>, Arc<dyn SessionStore>) {
    if STORE_BACKEND.as_str() == "memory" {
        tracing::warn!("Using the in-memory store, nothing will be persisted");
        return (
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySessionStore::new()),
        );
    }
    let db_conn = db::connect()
        .await
        .expect("Failed to connect to the database");
    let session_store = sessions::store::Connection::connect()
        .await
        .expect("Failed to connect to the session store");
    (Arc::new(PgStore::new(db_conn)), Arc::new(session_store))
}

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        eprintln!("No .env file loaded: {err}");
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("learnhub_api=info,tower_http=info")),
        )
        .init();

    let http = build_http_client(*api::HTTP_TIMEOUT_SECS)
        .expect("Failed to build the outbound HTTP client");
    let notifier: Arc<dyn Notifier> = match MailerConfig::from_env() {
        Some(config) => Arc::new(HttpMailer::new(config, http.clone())),
        None => {
            tracing::warn!("MAIL_API_KEY not set, enrollment emails will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let (store, session_store) = backends().await;
    let state = AppState {
        store,
        session_store,
        paypal: PayPalClient::new(PayPalConfig::from_env(), http.clone()),
        mpesa: MpesaClient::new(MpesaConfig::from_env(), http),
        notifier,
        verifier: Arc::new(AcceptAllVerifier::new()),
        app_url: api::APP_URL.clone(),
    };

    let listener = tokio::net::TcpListener::bind(api::BIND_ADDRESS.as_str())
        .await
        .expect("Failed to bind listener");
    tracing::info!("LearnHub checkout API listening on {}", api::BIND_ADDRESS.as_str());
    axum::serve(listener, routes::app(state))
        .await
        .expect("Failed to init Axum service");
}
