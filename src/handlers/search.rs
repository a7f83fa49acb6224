use axum::{
    extract::{Extension, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::bounded;
use super::documents::open_title;
use crate::error::ApiError;
use crate::middleware::auth::AuthContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub id: Uuid,
    pub title: String,
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

/// POST /api/search - rank the caller's documents against a query.
/// Results can only come from the partition the session is bound to.
pub async fn search(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<SearchRequest>,
) -> ApiResult<Vec<SearchResult>> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let limit = payload
        .limit
        .unwrap_or(10)
        .clamp(1, state.search_max_limit);

    let timeout = state.binder.stage_timeout();
    let mut session = state.binder.bind(state.store.as_ref(), &ctx.identity).await?;
    let hits = bounded(timeout, session.search(&payload.query, limit)).await?;
    bounded(timeout, session.commit()).await?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let title = open_title(&state, &ctx, &hit.title)?;
        results.push(SearchResult {
            id: hit.id,
            title,
            score: hit.score,
            created_at: hit.created_at,
        });
    }

    Ok(ApiResponse::success(results))
}
