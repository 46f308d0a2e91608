use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::models::payment::{PaymentProvider, PaymentRecord, PaymentStatus},
    middleware::session::session_middleware,
    services::{payments, sessions::CustomerSession},
    state::AppState,
    utils::httperror::HttpError,
};

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/{payment_id}", get(get_payment))
        .layer(from_fn_with_state(state.clone(), session_middleware))
}

/// What the client is shown of a payment while it waits for the provider.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentResponse {
    id: Uuid,
    course_id: Uuid,
    provider: PaymentProvider,
    status: PaymentStatus,
    amount: i64,
    currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(payment: PaymentRecord) -> Self {
        Self {
            id: payment.id,
            course_id: payment.course_id,
            provider: payment.provider,
            status: payment.status(),
            amount: payment.amount,
            failure_reason: payment.metadata().failure_reason.clone(),
            currency: payment.currency,
        }
    }
}

async fn get_payment(
    State(state): State<AppState>,
    Extension(session): Extension<CustomerSession>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, HttpError> {
    let payment =
        payments::payment_status(state.store.as_ref(), session.user_id(), payment_id).await?;
    Ok(Json(payment.into()))
}
