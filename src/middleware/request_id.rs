use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use crate::audit::AuditEvent;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Trace identifier for one request, echoed from the caller or generated
/// here. Present on every response, success or failure.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Tenant tag attached to the response by the auth layer so the audit event
/// can name the tenant without the handle ever reaching the response body.
#[derive(Clone, Debug)]
pub struct TenantTag(pub String);

/// Outermost pipeline layer: trace id in, trace id out, and exactly one
/// audit event per request once the response is final.
pub async fn request_id_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let trace_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let operation = format!("{} {}", request.method(), request.uri().path());

    request.extensions_mut().insert(RequestId(trace_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let tenant_handle = response
        .extensions()
        .get::<TenantTag>()
        .map(|tag| tag.0.clone());

    state.audit.record(AuditEvent {
        trace_id,
        tenant_handle,
        operation,
        outcome: response.status().as_u16(),
        timestamp: Utc::now(),
    });

    response
}
