#![allow(dead_code, reason = "each test binary uses a different subset")]
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use learnhub_api::{
    db::{
        memory::MemoryStore,
        models::{appuser::AppUser, chapter::Chapter, course::Course},
    },
    routes,
    services::{
        notifications::LogNotifier,
        providers::{
            mpesa::{MpesaClient, MpesaConfig},
            paypal::{PayPalClient, PayPalConfig},
        },
        sessions::MemorySessionStore,
        webhooks::AcceptAllVerifier,
    },
    state::AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt as _;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const ORIGIN: &str = "https://learnhub.test";
pub const SESSION_TOKEN: &str = "session-token";
pub const OTHER_SESSION_TOKEN: &str = "other-session-token";

/// The application wired to in-memory storage and a mock provider server
/// standing in for PayPal, Daraja and the exchange-rate API.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub providers: MockServer,
    pub user_id: Uuid,
    pub other_user_id: Uuid,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let providers = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let user_id = Uuid::new_v4();
        let other_user_id = Uuid::new_v4();
        store
            .add_user(AppUser::new(user_id, "achieng@example.com", Some("Achieng")))
            .await;
        store
            .add_user(AppUser::new(other_user_id, "kamau@example.com", None))
            .await;
        sessions.insert(SESSION_TOKEN, user_id).await;
        sessions.insert(OTHER_SESSION_TOKEN, other_user_id).await;

        let http = reqwest::Client::new();
        let state = AppState {
            store: store.clone(),
            session_store: sessions,
            paypal: PayPalClient::new(
                PayPalConfig {
                    api_url: providers.uri(),
                    client_id: String::from("client-id"),
                    client_secret: String::from("client-secret"),
                    exchange_rate_url: format!("{}/rates", providers.uri()),
                },
                http.clone(),
            ),
            mpesa: MpesaClient::new(
                MpesaConfig {
                    api_url: providers.uri(),
                    consumer_key: String::from("consumer-key"),
                    consumer_secret: String::from("consumer-secret"),
                    shortcode: String::from("174379"),
                    passkey: String::from("passkey"),
                    callback_url: format!("{ORIGIN}/api/webhooks/mpesa"),
                },
                http,
            ),
            notifier: Arc::new(LogNotifier),
            verifier: Arc::new(AcceptAllVerifier::new()),
            app_url: String::from(ORIGIN),
        };
        Self {
            router: routes::app(state),
            store,
            providers,
            user_id,
            other_user_id,
        }
    }

    /// Add a published course with `chapters` published chapters and one
    /// unpublished chapter.
    pub async fn add_course(&self, price: Option<i64>, chapters: i32) -> Uuid {
        let course_id = Uuid::new_v4();
        self.store
            .add_course(Course {
                id: course_id,
                title: String::from("Building APIs in Rust"),
                instructor: String::from("Wambui"),
                image_url: Some(String::from("https://cdn.learnhub.test/rust.png")),
                price,
                is_published: true,
            })
            .await;
        for position in 1..=chapters + 1 {
            self.store
                .add_chapter(Chapter {
                    id: Uuid::new_v4(),
                    course_id,
                    title: format!("Chapter {position}"),
                    position,
                    is_published: position <= chapters,
                    is_free: position == 1,
                })
                .await;
        }
        course_id
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Send a JSON request, authenticated with `token` when given.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ORIGIN, ORIGIN);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");
        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    pub async fn mount_paypal_token(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "paypal-token" })),
            )
            .mount(&self.providers)
            .await;
    }

    pub async fn mount_mpesa_token(&self) {
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "daraja-token", "expires_in": "3599" })),
            )
            .mount(&self.providers)
            .await;
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON body")
    }
}
