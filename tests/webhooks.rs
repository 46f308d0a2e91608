mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{json_body, TestApp};
use learnhub_api::db::{
    models::payment::{
        MpesaDetails, PaymentInsert, PaymentProvider, PaymentStatus, ProviderDetails,
    },
    store::Store,
};
use serde_json::{json, Value};
use uuid::Uuid;

const MERCHANT_REQUEST_ID: &str = "29115-34620561-1";

async fn initiated_mpesa_payment(app: &TestApp, course_id: Uuid) -> Uuid {
    let mut insert = PaymentInsert::new(
        app.user_id,
        course_id,
        PaymentProvider::Mpesa,
        150_000,
        PaymentStatus::Initiated,
    );
    insert.metadata.details = ProviderDetails::Mpesa(MpesaDetails {
        phone_number: String::from("254712345678"),
        merchant_request_id: Some(String::from(MERCHANT_REQUEST_ID)),
        checkout_request_id: Some(String::from("ws_CO_191220191020363925")),
        receipt_number: None,
    });
    app.store.insert_payment(insert).await.expect("insert").id
}

fn stk_callback(result_code: i64, result_desc: &str) -> Value {
    json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": MERCHANT_REQUEST_ID,
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResultCode": result_code,
            "ResultDesc": result_desc,
        } }
    })
}

async fn post_webhook(
    app: &TestApp,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    let response = app
        .send(builder.body(Body::from(body.to_owned())).expect("valid request"))
        .await;
    let status = response.status();
    (status, json_body(response).await)
}

const PAYPAL_HEADERS: [(&str, &str); 4] = [
    ("paypal-transmission-id", "69cd13f0-d67a-11e5-baa3-778b53f4ae55"),
    ("paypal-transmission-time", "2016-02-18T20:01:35Z"),
    ("paypal-transmission-sig", "signature"),
    ("paypal-cert-url", "https://api.sandbox.paypal.com/v1/notifications/certs/CERT-1"),
];

#[tokio::test]
async fn successful_mpesa_callback_completes_and_finalizes_once() {
    let app = TestApp::spawn().await;
    let course_id = app.add_course(Some(150_000), 2).await;
    let payment_id = initiated_mpesa_payment(&app, course_id).await;
    let callback = stk_callback(0, "The service request is processed successfully.").to_string();

    for _ in 0..2 {
        let (status, body) = post_webhook(&app, "/api/webhooks/mpesa", &[], &callback).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ResultCode": 0, "ResultDesc": "Accepted" }));
    }

    let payment = app
        .store
        .payment(payment_id)
        .await
        .expect("lookup")
        .expect("payment exists");
    assert_eq!(payment.status(), PaymentStatus::Completed);
    assert_eq!(app.store.purchases_of(app.user_id).await.len(), 1);
    assert_eq!(app.store.progress_of(app.user_id).await.len(), 2);
}

#[tokio::test]
async fn failed_mpesa_callback_fails_without_purchase() {
    let app = TestApp::spawn().await;
    let course_id = app.add_course(Some(150_000), 2).await;
    let payment_id = initiated_mpesa_payment(&app, course_id).await;

    let (status, body) = post_webhook(
        &app,
        "/api/webhooks/mpesa",
        &[],
        &stk_callback(1, "The balance is insufficient for the transaction.").to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultCode"], json!(0));

    // a late success must not reverse the failure
    post_webhook(
        &app,
        "/api/webhooks/mpesa",
        &[],
        &stk_callback(0, "The service request is processed successfully.").to_string(),
    )
    .await;

    let payment = app
        .store
        .payment(payment_id)
        .await
        .expect("lookup")
        .expect("payment exists");
    assert_eq!(payment.status(), PaymentStatus::Failed);
    assert_eq!(
        payment.metadata().failure_reason.as_deref(),
        Some("The balance is insufficient for the transaction.")
    );
    assert!(app.store.purchases_of(app.user_id).await.is_empty());
}

#[tokio::test]
async fn unmatched_mpesa_callback_is_still_acknowledged() {
    let app = TestApp::spawn().await;
    let (status, body) = post_webhook(
        &app,
        "/api/webhooks/mpesa",
        &[],
        &stk_callback(0, "The service request is processed successfully.").to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ResultCode": 0, "ResultDesc": "Accepted" }));
}

#[tokio::test]
async fn malformed_mpesa_callback_is_rejected() {
    let app = TestApp::spawn().await;
    let (status, _) = post_webhook(&app, "/api/webhooks/mpesa", &[], r#"{"Body": {}}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn paypal_webhook_requires_signature_headers() {
    let app = TestApp::spawn().await;
    let event = json!({ "event_type": "PAYMENT.CAPTURE.COMPLETED", "resource": { "id": "CAP-1" } });
    let (status, body) = post_webhook(
        &app,
        "/api/webhooks/paypal",
        &PAYPAL_HEADERS[..3],
        &event.to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["paypal-cert-url"].is_string());
}

#[tokio::test]
async fn paypal_capture_for_unknown_transaction_is_acknowledged() {
    let app = TestApp::spawn().await;
    let event = json!({
        "id": "WH-58D329510W468432D-8HN650336L201105X",
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": { "id": "CAP-UNKNOWN", "status": "COMPLETED" },
    });
    let (status, body) = post_webhook(
        &app,
        "/api/webhooks/paypal",
        &PAYPAL_HEADERS,
        &event.to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
}

#[tokio::test]
async fn paypal_denied_capture_fails_the_payment() {
    let app = TestApp::spawn().await;
    let course_id = app.add_course(Some(150_000), 1).await;
    let (_, checkout) = app
        .call(
            Method::POST,
            "/api/checkout",
            Some(common::SESSION_TOKEN),
            Some(json!({ "courseId": course_id })),
        )
        .await;
    let payment_id: Uuid = serde_json::from_value(checkout["paymentId"].clone()).expect("payment ID");
    let transaction_id = app
        .store
        .payment(payment_id)
        .await
        .expect("lookup")
        .expect("payment exists")
        .transaction_id;

    let event = json!({
        "event_type": "PAYMENT.CAPTURE.DENIED",
        "resource": { "id": transaction_id, "status": "DENIED" },
    });
    let (status, _) = post_webhook(
        &app,
        "/api/webhooks/paypal",
        &PAYPAL_HEADERS,
        &event.to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let payment = app
        .store
        .payment(payment_id)
        .await
        .expect("lookup")
        .expect("payment exists");
    assert_eq!(payment.status(), PaymentStatus::Failed);
    assert_eq!(
        payment.metadata().failure_reason.as_deref(),
        Some("PayPal denied the capture")
    );
}

#[tokio::test]
async fn shared_endpoint_dispatches_on_provider_header() {
    let app = TestApp::spawn().await;
    let course_id = app.add_course(Some(150_000), 1).await;
    let payment_id = initiated_mpesa_payment(&app, course_id).await;

    let (status, body) = post_webhook(
        &app,
        "/api/webhooks",
        &[("x-payment-provider", "MPESA")],
        &stk_callback(0, "The service request is processed successfully.").to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultDesc"], json!("Accepted"));
    let payment = app
        .store
        .payment(payment_id)
        .await
        .expect("lookup")
        .expect("payment exists");
    assert_eq!(payment.status(), PaymentStatus::Completed);

    let (status, _) = post_webhook(
        &app,
        "/api/webhooks",
        &[("x-payment-provider", "stripe")],
        "{}",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_webhook(&app, "/api/webhooks", &[], "{}").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
