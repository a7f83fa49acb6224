use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::bounded;
use crate::error::ApiError;
use crate::middleware::auth::AuthContext;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::NewDocument;

/// Record-type discriminator bound into every sealed title.
pub const TITLE_RECORD_TYPE: &str = "document.title";

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// POST /api/documents - ingest a document into the caller's partition
pub async fn upload(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<UploadRequest>,
) -> ApiResult<UploadResponse> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    if payload.body.trim().is_empty() {
        return Err(ApiError::bad_request("body must not be empty"));
    }

    // The title is classified sensitive; it is sealed before it touches the
    // store and only ever decrypted under the owning tenant's handle.
    let sealed_title = state
        .codec
        .seal(&ctx.handle, TITLE_RECORD_TYPE, payload.title.as_bytes())?;

    let timeout = state.binder.stage_timeout();
    let mut session = state.binder.bind(state.store.as_ref(), &ctx.identity).await?;
    let id = bounded(
        timeout,
        session.insert_document(NewDocument {
            title: sealed_title,
            body: payload.body,
        }),
    )
    .await?;
    bounded(timeout, session.commit()).await?;

    Ok(ApiResponse::accepted(UploadResponse { id }))
}

/// GET /api/documents - list the caller's documents
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Vec<DocumentSummary>> {
    let timeout = state.binder.stage_timeout();
    let mut session = state.binder.bind(state.store.as_ref(), &ctx.identity).await?;
    let docs = bounded(timeout, session.list_documents()).await?;
    bounded(timeout, session.commit()).await?;

    let mut summaries = Vec::with_capacity(docs.len());
    for doc in docs {
        let title = open_title(&state, &ctx, &doc.title)?;
        summaries.push(DocumentSummary {
            id: doc.id,
            title,
            created_at: doc.created_at,
        });
    }

    Ok(ApiResponse::success(summaries))
}

/// DELETE /api/documents/:id - remove one of the caller's documents
pub async fn remove(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let timeout = state.binder.stage_timeout();
    let mut session = state.binder.bind(state.store.as_ref(), &ctx.identity).await?;
    let found = bounded(timeout, session.delete_document(id)).await?;
    bounded(timeout, session.commit()).await?;

    if !found {
        // Another tenant's id and a nonexistent id are indistinguishable.
        return Err(ApiError::not_found("Document not found"));
    }

    Ok(ApiResponse::success(json!({ "deleted": id })))
}

pub(crate) fn open_title(
    state: &AppState,
    ctx: &AuthContext,
    sealed: &crate::codec::EncryptedRecord,
) -> Result<String, ApiError> {
    let bytes = state.codec.open(&ctx.handle, sealed)?;
    String::from_utf8(bytes).map_err(|_| {
        tracing::error!("sealed title decrypted to non-utf8 bytes");
        ApiError::internal_server_error("An error occurred while processing your request")
    })
}
