use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::fmt::Display;
use streams_protocol::HttpErrorEnvelope;

pub type HttpResponse = Response;
pub type HttpResult<T = ()> = Result<T, HttpResponse>;

/// Error surfaces named in spec §7. Not every handler produces every kind.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("missing or invalid authentication")]
    Unauthenticated,
    #[error("insufficient scope")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("stream is closed")]
    Closed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<crate::blob::BlobError> for ApiError {
    fn from(err: crate::blob::BlobError) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(msg) => bad_request(msg),
            Self::Unauthenticated => json_error(StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Forbidden => json_error(StatusCode::FORBIDDEN, self.to_string()),
            Self::NotFound(msg) => not_found(msg),
            Self::Conflict(msg) => conflict(msg),
            Self::Closed => {
                let mut response = conflict("stream is closed");
                try_set_header(&mut response, "stream-closed", "true");
                response
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                internal_error("internal error")
            }
        }
    }
}

pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    (status, Json(HttpErrorEnvelope::new(message))).into_response()
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, message)
}

pub fn conflict(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::CONFLICT, message)
}

/// Adds a header if both the name and the value are well-formed; silently
/// skips malformed values rather than failing the whole response.
pub fn try_set_header(response: &mut Response, name: &'static str, value: impl AsRef<str>) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(name),
        HeaderValue::from_str(value.as_ref()),
    ) {
        response.headers_mut().insert(name, value);
    }
}

/// Sets `Stream-Next-Offset` (and its `ETag` mirror), `Stream-Up-To-Date`,
/// and `Stream-Closed` per spec §6's response header table.
pub fn set_offset_headers(
    response: &mut Response,
    next_offset: &streams_protocol::Offset,
    closed: bool,
    up_to_date: Option<bool>,
) {
    let encoded = next_offset.encode();
    try_set_header(response, "stream-next-offset", &encoded);
    try_set_header(response, "etag", &encoded);
    if closed {
        try_set_header(response, "stream-closed", "true");
    }
    if let Some(true) = up_to_date {
        try_set_header(response, "stream-up-to-date", "true");
    }
}

/// `public, max-age=60, stale-while-revalidate=300` for cacheable immediate
/// reads; `no-store` for long-poll timeouts and `offset=now` shared-cache
/// reads (spec §4.3, §6).
pub fn set_cache_control(response: &mut Response, cacheable: bool) {
    let value = if cacheable {
        "public, max-age=60, stale-while-revalidate=300"
    } else {
        "no-store"
    };
    try_set_header(response, "cache-control", value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(response: Response, expected_status: StatusCode, expected_message: &str) {
        assert_eq!(response.status(), expected_status);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: HttpErrorEnvelope =
            serde_json::from_slice(&body).expect("response body should be valid error json");
        assert_eq!(parsed.error, expected_message);
    }

    #[tokio::test]
    async fn internal_error_sets_internal_contract() {
        let response = internal_error("database unavailable");
        assert_error_response(response, StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").await;
    }

    #[tokio::test]
    async fn bad_request_sets_bad_request_contract() {
        let response = bad_request("invalid query");
        assert_error_response(response, StatusCode::BAD_REQUEST, "invalid query").await;
    }

    #[tokio::test]
    async fn not_found_sets_not_found_contract() {
        let response = not_found("stream missing");
        assert_error_response(response, StatusCode::NOT_FOUND, "stream missing").await;
    }

    #[tokio::test]
    async fn conflict_sets_conflict_contract() {
        let response = conflict("duplicate token");
        assert_error_response(response, StatusCode::CONFLICT, "duplicate token").await;
    }

    #[tokio::test]
    async fn api_error_variants_map_to_expected_status() {
        assert_eq!(
            ApiError::Validation("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn closed_sets_conflict_and_stream_closed_header() {
        let response = ApiError::Closed.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers().get("stream-closed").unwrap(), "true");
    }
}
