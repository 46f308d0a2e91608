use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request_origin;
use crate::{
    db::models::course::Course,
    middleware::session::{optional_session_middleware, session_middleware},
    services::{
        cart::{self, errors::CartError, CartScope, CartSelection},
        sessions::CustomerSession,
    },
    state::AppState,
    utils::{extract::ApiJson, httperror::HttpError},
};

pub fn create_router(state: &AppState) -> Router<AppState> {
    let visitor = Router::new()
        .route("/", get(list_cart).post(add_to_cart))
        .route("/{course_id}", delete(remove_from_cart))
        .layer(from_fn_with_state(
            state.clone(),
            optional_session_middleware,
        ));
    let customer = Router::new()
        .route("/checkout", post(checkout_cart))
        .layer(from_fn_with_state(state.clone(), session_middleware));
    visitor.merge(customer)
}

fn scope_of(session: Option<CustomerSession>) -> CartScope {
    session.map_or(CartScope::Anonymous, |session| {
        CartScope::User(session.user_id())
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CartItem {
    id: Uuid,
    title: String,
    instructor: String,
    image_url: Option<String>,
    price: i64,
}

impl From<Course> for CartItem {
    fn from(course: Course) -> Self {
        Self {
            price: course.price_or_zero(),
            id: course.id,
            title: course.title,
            instructor: course.instructor,
            image_url: course.image_url,
        }
    }
}

#[derive(Serialize)]
struct CartResponse {
    items: Vec<CartItem>,
}

async fn list_cart(
    State(state): State<AppState>,
    Extension(session): Extension<Option<CustomerSession>>,
    cookies: CookieJar,
) -> Result<Json<CartResponse>, HttpError> {
    let selection = CartSelection::from_cookies(&cookies, scope_of(session));
    let courses = cart::cart_courses(state.store.as_ref(), &selection).await?;
    Ok(Json(CartResponse {
        items: courses.into_iter().map(CartItem::from).collect(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddToCartBody {
    course_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CartChangeResponse {
    success: bool,
    course_ids: Vec<Uuid>,
}

async fn add_to_cart(
    State(state): State<AppState>,
    Extension(session): Extension<Option<CustomerSession>>,
    cookies: CookieJar,
    ApiJson(body): ApiJson<AddToCartBody>,
) -> Result<(CookieJar, Json<CartChangeResponse>), HttpError> {
    state
        .store
        .course(body.course_id)
        .await?
        .filter(|course| course.is_published)
        .ok_or_else(|| HttpError::new(StatusCode::NOT_FOUND, Some(String::from("Course not found"))))?;
    let mut selection = CartSelection::from_cookies(&cookies, scope_of(session));
    selection.add(body.course_id)?;
    let course_ids = selection.course_ids().to_vec();
    Ok((
        selection.save(cookies),
        Json(CartChangeResponse {
            success: true,
            course_ids,
        }),
    ))
}

async fn remove_from_cart(
    Extension(session): Extension<Option<CustomerSession>>,
    cookies: CookieJar,
    Path(course_id): Path<Uuid>,
) -> (CookieJar, Json<CartChangeResponse>) {
    let mut selection = CartSelection::from_cookies(&cookies, scope_of(session));
    selection.remove(course_id);
    let course_ids = selection.course_ids().to_vec();
    (
        selection.save(cookies),
        Json(CartChangeResponse {
            success: true,
            course_ids,
        }),
    )
}

#[derive(Serialize)]
struct CartCheckoutResponse {
    completed: Vec<Uuid>,
    skipped: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

async fn checkout_cart(
    State(state): State<AppState>,
    Extension(session): Extension<CustomerSession>,
    headers: HeaderMap,
    cookies: CookieJar,
) -> Result<(CookieJar, Json<CartCheckoutResponse>), HttpError> {
    let origin = request_origin(&headers, &state);
    let mut selection = CartSelection::from_cookies(&cookies, CartScope::User(session.user_id()));
    let result = cart::checkout_cart(
        state.store.as_ref(),
        state.notifier.as_ref(),
        session.user_id(),
        &mut selection,
        &origin,
    )
    .await?;
    Ok((
        selection.save(cookies),
        Json(CartCheckoutResponse {
            completed: result.completed,
            skipped: result.skipped,
            url: result.url,
        }),
    ))
}

impl From<CartError> for HttpError {
    fn from(error: CartError) -> Self {
        match error {
            err @ CartError::Full(_) => Self::validation("courseId", &err.to_string()),
        }
    }
}
