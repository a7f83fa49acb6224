use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::error::ApiError;
use crate::limiter::Decision;
use crate::middleware::auth::AuthContext;
use crate::state::AppState;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Admission control ahead of the business logic. Runs after authentication,
/// before any unit of work is opened, so a denied request consumes nothing
/// but its counter slot.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| {
            ApiError::unauthorized("Authentication required before rate limiting")
        })?;

    let decision = state
        .limiter
        .check_and_consume(&ctx.handle, ctx.tier)
        .await
        .map_err(ApiError::from)?;

    if !decision.allowed {
        let mut response =
            ApiError::too_many_requests("Rate limit exceeded").into_response();
        apply_quota_headers(&mut response, &decision);
        let retry_after = decision.retry_after_secs(Utc::now());
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(RETRY_AFTER_HEADER, value);
        }
        return Ok(response);
    }

    let mut response = next.run(request).await;
    apply_quota_headers(&mut response, &decision);
    Ok(response)
}

/// Quota headers go on every response from a rate-limited endpoint,
/// admitted or denied.
fn apply_quota_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert(LIMIT_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert(REMAINING_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.timestamp().to_string()) {
        headers.insert(RESET_HEADER, value);
    }
}
