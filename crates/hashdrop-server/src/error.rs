use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hashdrop_core::HashdropError;

/// Server error type that maps to HTTP status codes.
#[derive(Debug)]
pub enum ServerError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Internal(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            // Details stay in the log; clients only learn that it failed.
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self);
        } else {
            tracing::debug!(status = %status, error = %self);
        }
        (status, message).into_response()
    }
}

impl From<HashdropError> for ServerError {
    fn from(e: HashdropError) -> Self {
        if e.is_not_found() {
            return Self::NotFound("file not found".into());
        }
        match e {
            HashdropError::EmptyUpload => Self::BadRequest("no file uploaded".into()),
            HashdropError::InvalidDigest(_) => Self::NotFound("file not found".into()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_http_semantics() {
        let cases = [
            (HashdropError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (HashdropError::ConsistencyFault("x".into()), StatusCode::NOT_FOUND),
            (HashdropError::InvalidDigest("x".into()), StatusCode::NOT_FOUND),
            (HashdropError::EmptyUpload, StatusCode::BAD_REQUEST),
            (HashdropError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn internal_details_are_not_returned() {
        let resp = ServerError::Internal("/srv/data/blobs/abc: permission denied".into())
            .into_response();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"internal error");
    }
}
