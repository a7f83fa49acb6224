// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// Internal error kinds (which key failed, which store timed out) are logged
/// at the conversion sites below and never echoed to the caller.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TooManyRequests(_) => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert module error types to ApiError. Every arm collapses the internal
// detail into a generic client message; the detail goes to the log.
impl From<crate::auth::resolver::AuthError> for ApiError {
    fn from(err: crate::auth::resolver::AuthError) -> Self {
        use crate::auth::resolver::AuthError;
        match &err {
            AuthError::Unauthenticated(reason) => {
                tracing::debug!("request without usable credential: {}", reason);
            }
            AuthError::InvalidCredential(reason) => {
                tracing::warn!("credential rejected: {}", reason);
            }
        }
        // Both kinds collapse to one external response so a probe cannot
        // distinguish "no such token" from "expired token".
        ApiError::unauthorized("Authentication required")
    }
}

impl From<crate::tenant::ScopeError> for ApiError {
    fn from(err: crate::tenant::ScopeError) -> Self {
        // Scoping failures are fatal to the request and never retried:
        // proceeding unscoped would be worse than failing.
        tracing::error!("tenant scope binding failed: {}", err);
        ApiError::internal_server_error("An error occurred while processing your request")
    }
}

impl From<crate::limiter::LimiterError> for ApiError {
    fn from(err: crate::limiter::LimiterError) -> Self {
        tracing::error!("rate limiter unavailable: {}", err);
        ApiError::service_unavailable("Service temporarily unavailable")
    }
}

impl From<crate::codec::CodecError> for ApiError {
    fn from(err: crate::codec::CodecError) -> Self {
        use crate::codec::CodecError;
        match &err {
            CodecError::TamperDetected => {
                // Corruption or an attack; either way the bytes are not
                // usable under this tenant.
                tracing::error!("sealed record failed authentication");
                ApiError::forbidden("Access denied")
            }
            other => {
                tracing::error!("metadata codec error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match err {
            StoreError::NotFound(msg) => ApiError::not_found(msg),
            StoreError::Unavailable(msg) => {
                tracing::error!("document store unavailable: {}", msg);
                ApiError::service_unavailable("Service temporarily unavailable")
            }
            StoreError::Query(msg) => {
                tracing::error!("document store query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            StoreError::Sqlx(e) => {
                tracing::error!("sqlx error: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_variants() {
        assert_eq!(ApiError::unauthorized("x").status_code(), 401);
        assert_eq!(ApiError::forbidden("x").status_code(), 403);
        assert_eq!(ApiError::too_many_requests("x").status_code(), 429);
        assert_eq!(ApiError::internal_server_error("x").status_code(), 500);
        assert_eq!(ApiError::service_unavailable("x").status_code(), 503);
    }

    #[test]
    fn auth_errors_collapse_to_generic_unauthorized() {
        use crate::auth::resolver::AuthError;
        let a: ApiError = AuthError::Unauthenticated("missing header".into()).into();
        let b: ApiError = AuthError::InvalidCredential("expired".into()).into();
        assert_eq!(a.message(), b.message());
        assert_eq!(a.status_code(), 401);
    }
}
