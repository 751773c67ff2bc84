//! Error types for the avatar cache server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

/// Startup and process-level failures
#[derive(Debug)]
pub enum ServerError {
    Cache(avatar_cache::CacheError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Cache(err) => write!(f, "Cache error: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Cache(err) => Some(err),
            ServerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<avatar_cache::CacheError> for ServerError {
    fn from(err: avatar_cache::CacheError) -> Self {
        ServerError::Cache(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Handler error that converts to a JSON response
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound,
    CacheDisabled,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid or missing token".into()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".into()),
            ApiError::CacheDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Cache is disabled".into(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ServerError::Config("bad PORT".to_string());
        assert_eq!(format!("{}", err), "Configuration error: bad PORT");
    }

    #[test]
    fn test_cache_error_wraps_source() {
        use std::error::Error;
        let err = ServerError::from(avatar_cache::CacheError::Config(
            "cache directory is not writable".to_string(),
        ));
        assert!(format!("{}", err).contains("not writable"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::CacheDisabled.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
