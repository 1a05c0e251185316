use http::StatusCode;
use switchboard_core::HttpError;
use thiserror::Error;

/// Errors raised while translating or forwarding a request
#[derive(Debug, Error)]
pub enum LlmError {
    /// Client sent a body that does not match the Messages API shape
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Well-formed content that has no backend equivalent
    #[error("cannot translate request: {0}")]
    Translation(String),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {message}")]
    Backend {
        /// Status code as reported by the backend
        status: StatusCode,
        /// Message extracted from the backend's error body
        message: String,
    },

    /// Backend could not be reached or the connection broke
    #[error("backend request failed: {0}")]
    Transport(String),

    /// Backend did not answer within the configured bound
    #[error("backend did not respond within {0} seconds")]
    Timeout(u64),

    /// Stream broke after the response had started
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Translation(_) => StatusCode::BAD_REQUEST,
            Self::Backend { status, .. } => *status,
            Self::Transport(_) | Self::Streaming(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) | Self::Translation(_) => "invalid_request_error",
            Self::Backend { status, .. } => error_type_for_status(*status),
            Self::Timeout(_) => "timeout_error",
            Self::Transport(_) | Self::Streaming(_) | Self::Internal(_) => "api_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            Self::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Anthropic error type matching a backend status code
fn error_type_for_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 | 422 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        413 => "request_too_large",
        429 => "rate_limit_error",
        504 => "timeout_error",
        529 => "overloaded_error",
        _ => "api_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(status: u16) -> LlmError {
        LlmError::Backend {
            status: StatusCode::from_u16(status).unwrap(),
            message: "upstream said no".to_owned(),
        }
    }

    #[test]
    fn backend_status_is_preserved() {
        let err = backend(429);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_type(), "rate_limit_error");
        assert_eq!(err.client_message(), "upstream said no");
    }

    #[test]
    fn backend_auth_failure_maps_to_authentication_error() {
        assert_eq!(backend(401).error_type(), "authentication_error");
        assert_eq!(backend(503).error_type(), "api_error");
    }

    #[test]
    fn translation_errors_are_client_errors() {
        let err = LlmError::Translation("image in assistant turn".to_owned());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = LlmError::Internal(anyhow::anyhow!("secret detail"));
        assert_eq!(err.client_message(), "an internal error occurred");
        assert!(err.is_server_error());
    }
}
