//! Error translation.
//!
//! Every error leaves the gateway as `{"code", "title", "detail"}` with the
//! status of its taxonomy class. Upstream errors keep the platform's own code
//! and title.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::observability::current_request_id;

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine readable code.
    pub code: i64,
    /// Short title.
    pub title: String,
    /// Human readable detail.
    pub detail: String,
}

impl Error {
    /// HTTP status of this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedToken(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamAuth(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::OperationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body rendered for this error.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let status = self.status();
        let title = status.canonical_reason().unwrap_or("Error").to_string();
        let code = i64::from(status.as_u16());

        match self {
            Self::Upstream {
                code, title, detail, ..
            } => ErrorBody {
                code: *code,
                title: title.clone(),
                detail: detail.clone(),
            },
            Self::OperationFailed { .. } => ErrorBody {
                code,
                title,
                detail: "An internal error occurred".to_string(),
            },
            Self::MalformedToken(detail)
            | Self::Unauthorized(detail)
            | Self::Forbidden(detail)
            | Self::NotFound(detail)
            | Self::InvalidInput(detail)
            | Self::UpstreamAuth(detail)
            | Self::Conflict(detail) => ErrorBody {
                code,
                title,
                detail: detail.clone(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(
                request_id = current_request_id().as_deref().unwrap_or("-"),
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Error::MalformedToken("x".into()), 400; "malformed token")]
    #[test_case(Error::Unauthorized("x".into()), 401; "unauthorized")]
    #[test_case(Error::Forbidden("x".into()), 403; "forbidden")]
    #[test_case(Error::NotFound("x".into()), 404; "not found")]
    #[test_case(Error::InvalidInput("x".into()), 400; "invalid input")]
    #[test_case(Error::Conflict("x".into()), 422; "conflict")]
    #[test_case(Error::UpstreamAuth("x".into()), 502; "upstream auth")]
    #[test_case(Error::operation("x", "y"), 500; "operation failed")]
    fn test_status(err: Error, expected: u16) {
        assert_eq!(err.status().as_u16(), expected);
    }

    #[test]
    fn test_upstream_keeps_platform_fields() {
        let err = Error::Upstream {
            status: 404,
            code: 10010,
            title: "CF-ResourceNotFound".to_string(),
            detail: "Space not found".to_string(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            err.body(),
            ErrorBody {
                code: 10010,
                title: "CF-ResourceNotFound".to_string(),
                detail: "Space not found".to_string(),
            }
        );
    }

    #[test]
    fn test_non_error_upstream_status_is_bad_gateway() {
        let err = Error::Upstream {
            status: 302,
            code: 302,
            title: "Found".to_string(),
            detail: String::new(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_cause_is_not_rendered() {
        let body = Error::operation("sqlite_query", "disk I/O error at /var/lib").body();
        assert_eq!(body.code, 500);
        assert_eq!(body.title, "Internal Server Error");
        assert!(!body.detail.contains("/var/lib"));
    }

    #[test]
    fn test_gateway_error_body() {
        let body = Error::Conflict("Unable to unbind".to_string()).body();
        assert_eq!(body.code, 422);
        assert_eq!(body.title, "Unprocessable Entity");
        assert_eq!(body.detail, "Unable to unbind");
    }
}
