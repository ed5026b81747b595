//! Crate-wide error type and its HTTP/RPC projections.
//!
//! Every subsystem defines its own `thiserror` enum (see `security`, `auth`,
//! `pathmap`, `rpc`) and converts it into a `DomainError` at the seam where
//! it crosses into shared code. `DomainError` is the only error type the
//! WebDAV and admin handlers ever see, which is what lets §7's error-kind
//! table live in one place.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Client-visible error kinds, per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    RateLimited,
    NotFound,
    Conflict,
    BadRequest,
    UpstreamUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The single error type that crosses from the core into the WebDAV/admin
/// handler layer. Carries a `kind` for status mapping and a user-friendly
/// `reason`; any debugging detail stays in the `source` chain and is only
/// ever logged, never serialized into the response body (§7).
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct DomainError {
    pub kind: ErrorKind,
    pub reason: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DomainError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, reason)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, reason)
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, reason)
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, reason)
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, reason)
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, reason)
    }

    pub fn upstream_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, reason)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    reason: String,
    timestamp: String,
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        if let Some(source) = &self.source {
            tracing::error!(kind = ?self.kind, reason = %self.reason, source = %source, "request failed");
        } else {
            tracing::warn!(kind = ?self.kind, reason = %self.reason, "request failed");
        }

        let body = ErrorBody {
            error: format!("{:?}", self.kind),
            reason: self.reason,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (self.kind.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_spec_table() {
        assert_eq!(ErrorKind::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorKind::UpstreamUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorKind::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reason_never_leaks_source_detail() {
        let err = DomainError::with_source(
            ErrorKind::Internal,
            "something went wrong",
            std::io::Error::new(std::io::ErrorKind::Other, "backend stack trace, ids, etc."),
        );
        assert_eq!(err.reason, "something went wrong");
    }
}
