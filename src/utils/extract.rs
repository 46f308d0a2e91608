//! Request extractors that reject malformed input with the API's JSON error
//! body instead of axum's plain-text rejections.
use std::sync::LazyLock;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{request::Parts, StatusCode},
    Json,
};
use regex::Regex;

use super::httperror::HttpError;

static FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"missing field `(\w+)`|unknown field `(\w+)`|: (\w+): ")
        .expect("Field regex invalid")
});

/// The field a deserialization error names, if any.
fn offending_field(message: &str) -> Option<&str> {
    let captures = FIELD_REGEX.captures(message)?;
    captures
        .iter()
        .skip(1)
        .flatten()
        .next()
        .map(|field| field.as_str())
}

/// A 400 for input that did not deserialize, naming the field when the
/// error does.
fn invalid_input(fallback_field: &str, message: &str) -> HttpError {
    // "Failed to deserialize ...: <serde error>"
    let detail = message.split_once(": ").map_or(message, |(_, rest)| rest);
    HttpError::validation(offending_field(message).unwrap_or(fallback_field), detail)
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        if matches!(rejection, JsonRejection::JsonDataError(_)) {
            return invalid_input("body", &message);
        }
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, Some(message))
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        invalid_input("query", &rejection.body_text())
    }
}

/// `Json` whose rejections are `HttpError`s.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections are `HttpError`s.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::offending_field;

    #[test]
    fn names_missing_and_mistyped_fields() {
        assert_eq!(
            offending_field("missing field `courseId` at line 1 column 2"),
            Some("courseId")
        );
        assert_eq!(
            offending_field("target type: courseId: UUID parsing failed at line 1 column 20"),
            Some("courseId")
        );
        assert_eq!(offending_field("EOF while parsing an object"), None);
    }
}
