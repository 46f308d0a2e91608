use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request_origin;
use crate::{
    db::models::{payment::PaymentStatus, purchase::Purchase},
    middleware::session::session_middleware,
    services::{
        checkout::{
            self, errors::CheckoutError, CheckoutOutcome, CheckoutRequest, ConfirmOutcome,
            Confirmation,
        },
        finalization::errors::FinalizationError,
        payments,
        sessions::CustomerSession,
    },
    state::AppState,
    utils::{
        extract::{ApiJson, ApiQuery},
        httperror::HttpError,
    },
};

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(do_checkout))
        .route("/confirm", get(confirm_checkout))
        .route("/paypal", post(start_paypal))
        .route("/paypal/capture", post(capture_paypal))
        .layer(from_fn_with_state(state.clone(), session_middleware))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequestBody {
    course_id: Uuid,
    return_url: Option<String>,
    payment_method: Option<String>,
    phone_number: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(untagged, rename_all_fields = "camelCase")]
enum CheckoutResponse {
    Free { success: bool, url: String },
    Redirect { url: String, payment_id: Uuid },
}

async fn do_checkout(
    State(state): State<AppState>,
    Extension(session): Extension<CustomerSession>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CheckoutRequestBody>,
) -> Result<Json<CheckoutResponse>, HttpError> {
    let origin = request_origin(&headers, &state);
    let request = CheckoutRequest {
        course_id: body.course_id,
        return_url: body.return_url,
        payment_method: body.payment_method,
        phone_number: body.phone_number,
    };
    let outcome = checkout::initiate(
        state.store.as_ref(),
        state.notifier.as_ref(),
        session.user_id(),
        request,
        &origin,
    )
    .await?;
    Ok(Json(match outcome {
        CheckoutOutcome::Free { url } => CheckoutResponse::Free { success: true, url },
        CheckoutOutcome::Redirect { url, payment_id } => {
            CheckoutResponse::Redirect { url, payment_id }
        }
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmQuery {
    course_id: Uuid,
    success: Option<String>,
    payment_id: Option<Uuid>,
}

#[derive(Serialize)]
struct PurchaseResponse {
    success: bool,
    purchase: Purchase,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ConfirmResponse {
    Enrolled(PurchaseResponse),
    #[serde(rename_all = "camelCase")]
    Pending {
        success: bool,
        pending: bool,
        payment_id: Uuid,
        status: PaymentStatus,
    },
}

/// Enrolled buyers get 200; payments still awaiting their provider get 202.
async fn confirm_checkout(
    State(state): State<AppState>,
    Extension(session): Extension<CustomerSession>,
    ApiQuery(query): ApiQuery<ConfirmQuery>,
) -> Result<(StatusCode, Json<ConfirmResponse>), HttpError> {
    let confirmation = Confirmation {
        course_id: query.course_id,
        success: matches!(query.success.as_deref(), Some("1" | "true")),
        payment_id: query.payment_id,
    };
    let outcome = checkout::confirm(
        state.store.as_ref(),
        state.notifier.as_ref(),
        &state.paypal,
        session.user_id(),
        confirmation,
    )
    .await?;
    Ok(match outcome {
        ConfirmOutcome::Enrolled(purchase) => (
            StatusCode::OK,
            Json(ConfirmResponse::Enrolled(PurchaseResponse {
                success: true,
                purchase,
            })),
        ),
        ConfirmOutcome::Pending { payment_id, status } => (
            StatusCode::ACCEPTED,
            Json(ConfirmResponse::Pending {
                success: false,
                pending: true,
                payment_id,
                status,
            }),
        ),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayPalBody {
    payment_id: Uuid,
}

#[derive(Serialize)]
struct ApprovalResponse {
    url: String,
}

async fn start_paypal(
    State(state): State<AppState>,
    Extension(session): Extension<CustomerSession>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<StartPayPalBody>,
) -> Result<Json<ApprovalResponse>, HttpError> {
    let origin = request_origin(&headers, &state);
    let url = payments::start_paypal(
        state.store.as_ref(),
        &state.paypal,
        session.user_id(),
        body.payment_id,
        &origin,
    )
    .await?;
    Ok(Json(ApprovalResponse { url }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapturePayPalBody {
    order_id: String,
}

async fn capture_paypal(
    State(state): State<AppState>,
    Extension(session): Extension<CustomerSession>,
    ApiJson(body): ApiJson<CapturePayPalBody>,
) -> Result<Json<PurchaseResponse>, HttpError> {
    let purchase = payments::capture_paypal(
        state.store.as_ref(),
        state.notifier.as_ref(),
        &state.paypal,
        session.user_id(),
        &body.order_id,
    )
    .await?;
    Ok(Json(PurchaseResponse {
        success: true,
        purchase,
    }))
}

impl From<FinalizationError> for HttpError {
    fn from(error: FinalizationError) -> Self {
        match error {
            FinalizationError::DatabaseError(err) => err.into(),
            err @ FinalizationError::Inconsistent { .. } => {
                tracing::error!("{err}");
                Self::from(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl From<CheckoutError> for HttpError {
    fn from(error: CheckoutError) -> Self {
        match error {
            CheckoutError::DatabaseError(err) => err.into(),
            CheckoutError::FinalizationError(err) => err.into(),
            CheckoutError::ProviderError(err) => {
                tracing::error!("Payment provider error during checkout: {err}");
                // provider responses are never passed through to the client
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some(String::from(
                        "The payment could not be processed, please try again",
                    )),
                )
            }
            CheckoutError::AlreadyOwned { user_id, course_id } => {
                tracing::info!("User {user_id} attempted to buy owned course {course_id}");
                Self::new(
                    StatusCode::FORBIDDEN,
                    Some(String::from("You already own this course")),
                )
            }
            CheckoutError::CourseNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, Some(String::from("Course not found")))
            }
            CheckoutError::PaymentNotFound(_) | CheckoutError::ReferenceNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, Some(String::from("Payment not found")))
            }
            CheckoutError::Validation { field, message } => Self::validation(field, &message),
            CheckoutError::PaymentNotApproved(reason) => {
                Self::new(StatusCode::BAD_REQUEST, Some(reason))
            }
        }
    }
}
