pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::codec::EncryptedRecord;
use crate::tenant::session::ScopedSession;
use crate::tenant::TenantHandle;

/// Errors from document store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query error: {0}")]
    Query(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// A document as submitted for ingest. The title is already sealed by the
/// codec before it reaches the store; the body is the search corpus.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: EncryptedRecord,
    pub body: String,
}

/// A persisted document row. The title stays sealed until a handler opens
/// it under the owning session's handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub title: EncryptedRecord,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub title: EncryptedRecord,
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

/// Backend capable of opening tenant-bound units of work.
///
/// `begin` is the single entry point to data access: the returned session
/// carries the handle for its whole lifetime and every query it runs is
/// scoped by the backend itself (row-level security in Postgres, partition
/// maps in memory), not by per-call-site checks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn begin(&self, handle: &TenantHandle) -> Result<Box<dyn ScopedSession>, StoreError>;

    async fn health(&self) -> Result<(), StoreError>;
}

/// Rank a tenant's documents against a query: total occurrence count of the
/// query terms in the body, ties broken by recency. Shared by both backends
/// so search behaves identically regardless of deployment.
pub(crate) fn rank_documents(
    rows: &[(Uuid, String, EncryptedRecord, DateTime<Utc>)],
    query: &str,
    limit: usize,
) -> Vec<SearchHit> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = rows
        .iter()
        .filter_map(|(id, body, title, created_at)| {
            let haystack = body.to_lowercase();
            let score: u32 = terms
                .iter()
                .map(|term| occurrences(&haystack, term))
                .sum();
            (score > 0).then(|| SearchHit {
                id: *id,
                title: title.clone(),
                score,
                created_at: *created_at,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    hits.truncate(limit);
    hits
}

fn occurrences(haystack: &str, needle: &str) -> u32 {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0u32;
    let mut at = 0;
    while let Some(found) = haystack[at..].find(needle) {
        count += 1;
        at += found + needle.len();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed() -> EncryptedRecord {
        EncryptedRecord {
            ciphertext: vec![1, 2, 3],
            nonce: vec![0; 12],
            auth_tag: vec![0; 16],
            aad: vec![9],
        }
    }

    fn row(body: &str, age_secs: i64) -> (Uuid, String, EncryptedRecord, DateTime<Utc>) {
        (
            Uuid::new_v4(),
            body.to_string(),
            sealed(),
            Utc::now() - chrono::Duration::seconds(age_secs),
        )
    }

    #[test]
    fn ranks_by_occurrence_count() {
        let rows = vec![
            row("alpha beta", 0),
            row("alpha alpha alpha", 0),
            row("gamma", 0),
        ];
        let hits = rank_documents(&rows, "alpha", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, 3);
        assert_eq!(hits[1].score, 1);
    }

    #[test]
    fn recency_breaks_ties() {
        let newer = row("needle", 10);
        let older = row("needle", 1000);
        let hits = rank_documents(&[older.clone(), newer.clone()], "needle", 10);
        assert_eq!(hits[0].id, newer.0);
        assert_eq!(hits[1].id, older.0);
    }

    #[test]
    fn respects_limit_and_empty_query() {
        let rows = vec![row("a b c", 0), row("a", 0), row("a b", 0)];
        assert_eq!(rank_documents(&rows, "a", 2).len(), 2);
        assert!(rank_documents(&rows, "   ", 10).is_empty());
        assert!(rank_documents(&rows, "a", 0).is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let rows = vec![row("Needle in the HAYSTACK", 0)];
        let hits = rank_documents(&rows, "needle haystack", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 2);
    }
}
