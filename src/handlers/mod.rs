pub mod documents;
pub mod search;

use std::future::Future;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

/// Run one store operation under the stage timeout. A timed-out operation
/// surfaces as a generic server error; the session it ran on is dropped by
/// the caller's error path, which releases the binding.
pub(crate) async fn bounded<T, E>(
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, ApiError>
where
    ApiError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            tracing::error!(
                "store operation exceeded {}ms stage timeout",
                limit.as_millis()
            );
            Err(ApiError::internal_server_error(
                "An error occurred while processing your request",
            ))
        }
    }
}

pub async fn root() -> axum::response::Json<serde_json::Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Carrel API",
            "version": version,
            "description": "Multi-tenant document knowledge service",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "documents": "/api/documents[/:id] (bearer auth)",
                "search": "/api/search (bearer auth)",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                axum::response::Json(json!({
                    "success": false,
                    "error": "store unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                    }
                })),
            )
        }
    }
}
