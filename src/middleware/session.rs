//! Middleware resolving the session cookie to a signed-in customer.
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{services::sessions::CustomerSession, state::AppState, utils::httperror::HttpError};

/// Resolve the session cookie, if any, without rejecting the request.
async fn resolve(state: &AppState, cookie_jar: &CookieJar) -> Result<Option<CustomerSession>, HttpError> {
    CustomerSession::from_cookies(cookie_jar, state.session_store.as_ref())
        .await
        .map_err(|err| {
            tracing::error!("Error loading session from store: {err}");
            HttpError::from(StatusCode::INTERNAL_SERVER_ERROR)
        })
}

/// Middleware requiring a valid session. The `CustomerSession` is added to
/// the request extensions.
pub async fn session_middleware(
    State(state): State<AppState>,
    cookie_jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let session = resolve(&state, &cookie_jar).await?.ok_or_else(|| {
        tracing::debug!("Request to {} without a valid session", req.uri().path());
        HttpError::new(
            StatusCode::UNAUTHORIZED,
            Some(String::from("Sign in to continue")),
        )
    })?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Does the same as `session_middleware` but lets anonymous requests
/// through. An `Option<CustomerSession>` is added to the request extensions.
pub async fn optional_session_middleware(
    State(state): State<AppState>,
    cookie_jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let session = resolve(&state, &cookie_jar).await?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
