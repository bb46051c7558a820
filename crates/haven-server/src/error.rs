use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use haven_shared::ValidationError;
use haven_store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found")]
    NotFound,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("{service} service failed{}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        body: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable tag carried in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound => "not_found",
            ApiError::RateLimited => "rate_limited",
            ApiError::Upstream { .. } => "upstream_failure",
            ApiError::StoreUnavailable(_) => "store_unavailable",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Validation failure for a payload of `what`.
    pub fn invalid(what: impl std::fmt::Display, err: ValidationError) -> Self {
        ApiError::InvalidRequest(format!("{what}: {err}"))
    }

    pub fn upstream_transport(service: &'static str, err: reqwest::Error) -> Self {
        ApiError::Upstream {
            service,
            status: None,
            body: err.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Unavailable(msg) => ApiError::StoreUnavailable(msg),
            StoreError::Unsupported(msg) => ApiError::InvalidRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("store task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::Upstream {
                service,
                status: upstream_status,
                body,
            } => {
                tracing::warn!(service, status = ?upstream_status, "Upstream call failed");
                json!({
                    "error": self.to_string(),
                    "kind": self.kind(),
                    "service": service,
                    "upstreamStatus": upstream_status,
                    "upstreamBody": body,
                })
            }
            ApiError::StoreUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Store unavailable");
                json!({
                    "error": "Store temporarily unavailable",
                    "kind": self.kind(),
                })
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
                json!({
                    "error": "Internal server error",
                    "kind": self.kind(),
                })
            }
            _ => json!({
                "error": self.to_string(),
                "kind": self.kind(),
            }),
        };

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, ApiError::StoreUnavailable(_)) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_kinds() {
        assert_eq!(ApiError::from(StoreError::NotFound).kind(), "not_found");
        assert_eq!(
            ApiError::from(StoreError::Conflict("dup".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::Unavailable("busy".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_upstream_status_passes_through() {
        let err = ApiError::Upstream {
            service: "assistant",
            status: Some(429),
            body: "slow down".into(),
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        let transport = ApiError::Upstream {
            service: "assistant",
            status: None,
            body: "connection refused".into(),
        };
        assert_eq!(transport.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_store_unavailable_sets_retry_after() {
        let response = ApiError::StoreUnavailable("locked".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
