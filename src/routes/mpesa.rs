use axum::{
    extract::State, middleware::from_fn_with_state, routing::post, Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    middleware::session::session_middleware,
    services::{
        payments::{self, StkRequest},
        sessions::CustomerSession,
    },
    state::AppState,
    utils::{extract::ApiJson, httperror::HttpError},
};

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/stk", post(initiate_stk))
        .layer(from_fn_with_state(state.clone(), session_middleware))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StkRequestBody {
    course_id: Uuid,
    phone_number: String,
    amount: Option<i64>,
    payment_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StkResponse {
    success: bool,
    message: String,
    checkout_id: String,
}

async fn initiate_stk(
    State(state): State<AppState>,
    Extension(session): Extension<CustomerSession>,
    ApiJson(body): ApiJson<StkRequestBody>,
) -> Result<Json<StkResponse>, HttpError> {
    let initiated = payments::initiate_stk(
        state.store.as_ref(),
        &state.mpesa,
        session.user_id(),
        StkRequest {
            course_id: body.course_id,
            phone_number: body.phone_number,
            amount: body.amount,
            payment_id: body.payment_id,
        },
    )
    .await?;
    Ok(Json(StkResponse {
        success: true,
        message: initiated.message,
        checkout_id: initiated.checkout_request_id,
    }))
}
