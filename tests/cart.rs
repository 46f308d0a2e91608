mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
};
use common::{json_body, TestApp, ORIGIN, SESSION_TOKEN};
use learnhub_api::db::models::course::Course;
use serde_json::json;
use uuid::Uuid;

fn set_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("cart cookie is written")
        .to_str()
        .expect("ASCII cookie")
        .to_owned()
}

/// The `name=value` pair of a `Set-Cookie` header.
fn cookie_pair(set_cookie: &str) -> &str {
    set_cookie.split(';').next().unwrap_or_default()
}

fn cart_request(method: Method, uri: &str, cookies: &[&str], body: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::ORIGIN, ORIGIN);
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies.join("; "));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body)),
        None => builder.body(Body::empty()),
    }
    .expect("valid request")
}

#[tokio::test]
async fn anonymous_cart_lives_in_cart_cookie() {
    let app = TestApp::spawn().await;
    let course_id = app.add_course(Some(150_000), 1).await;

    let response = app
        .send(cart_request(
            Method::POST,
            "/api/cart",
            &[],
            Some(json!({ "courseId": course_id }).to_string()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let written = set_cookie(&response);
    assert!(written.starts_with(&format!("cart={course_id}")));
    assert!(written.contains("Max-Age=604800"));
    assert!(written.contains("HttpOnly"));

    let response = app
        .send(cart_request(Method::GET, "/api/cart", &[cookie_pair(&written)], None))
        .await;
    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({ "items": [{
            "id": course_id,
            "title": "Building APIs in Rust",
            "instructor": "Wambui",
            "imageUrl": "https://cdn.learnhub.test/rust.png",
            "price": 150_000,
        }] })
    );

    let response = app
        .send(cart_request(
            Method::DELETE,
            &format!("/api/cart/{course_id}"),
            &[cookie_pair(&written)],
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cookie_pair(&set_cookie(&response)), "cart=");
}

#[tokio::test]
async fn signed_in_cart_uses_a_per_user_cookie() {
    let app = TestApp::spawn().await;
    let course_id = app.add_course(Some(150_000), 1).await;
    let session = format!("session={SESSION_TOKEN}");

    let response = app
        .send(cart_request(
            Method::POST,
            "/api/cart",
            &[&session],
            Some(json!({ "courseId": course_id }).to_string()),
        ))
        .await;
    let written = set_cookie(&response);
    assert!(written.starts_with(&format!("cart_{}={course_id}", app.user_id)));
    assert!(written.contains("Max-Age=2592000"));
}

#[tokio::test]
async fn listing_skips_unavailable_courses() {
    let app = TestApp::spawn().await;
    let listed = app.add_course(Some(0), 1).await;
    let hidden = Uuid::new_v4();
    app.store
        .add_course(Course {
            id: hidden,
            title: String::from("Draft course"),
            instructor: String::from("Wambui"),
            image_url: None,
            price: Some(100_000),
            is_published: false,
        })
        .await;
    let cookie = format!("cart={hidden},{},{listed}", Uuid::new_v4());

    let response = app
        .send(cart_request(Method::GET, "/api/cart", &[&cookie], None))
        .await;
    let body = json_body(response).await;
    let items = body["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!(listed));
    assert_eq!(items[0]["price"], json!(0));
}

#[tokio::test]
async fn unpublished_course_cannot_be_added() {
    let app = TestApp::spawn().await;
    let response = app
        .send(cart_request(
            Method::POST,
            "/api/cart",
            &[],
            Some(json!({ "courseId": Uuid::new_v4() }).to_string()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn cart_checkout_enrolls_free_courses_and_stops_at_paid() {
    let app = TestApp::spawn().await;
    let free = app.add_course(Some(0), 2).await;
    let paid = app.add_course(Some(150_000), 1).await;
    let session = format!("session={SESSION_TOKEN}");
    let cart = format!("cart_{}={free},{paid}", app.user_id);

    let response = app
        .send(cart_request(
            Method::POST,
            "/api/cart/checkout",
            &[&session, &cart],
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let written = set_cookie(&response);
    assert_eq!(cookie_pair(&written), format!("cart_{}={paid}", app.user_id));
    let body = json_body(response).await;
    assert_eq!(body["completed"], json!([free]));
    assert_eq!(body["skipped"], json!([]));
    assert!(body["url"]
        .as_str()
        .is_some_and(|url| url.starts_with("https://learnhub.test/checkout/paypal?paymentId=")));
    assert_eq!(app.store.purchases_of(app.user_id).await.len(), 1);
    assert_eq!(app.store.payments().await.len(), 1);
}

#[tokio::test]
async fn cart_checkout_requires_a_session() {
    let app = TestApp::spawn().await;
    let response = app
        .send(cart_request(Method::POST, "/api/cart/checkout", &[], None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
