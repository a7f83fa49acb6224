//! In-memory document store for single-instance deployments and tests.
//!
//! Each tenant handle maps to its own partition vector; a session can only
//! ever read or mutate the partition it was bound to at `begin`. Writes are
//! staged inside the session and applied on commit, so dropping a session
//! without committing discards them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::codec::EncryptedRecord;
use crate::store::{
    rank_documents, DocumentStore, NewDocument, SearchHit, StoreError, StoredDocument,
};
use crate::tenant::session::ScopedSession;
use crate::tenant::TenantHandle;

#[derive(Debug, Clone)]
struct DocRow {
    id: Uuid,
    title: EncryptedRecord,
    body: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    partitions: Arc<RwLock<HashMap<String, Vec<DocRow>>>>,
    live_bindings: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently holding a tenant binding. Returns to
    /// zero once every session has been committed or dropped; a nonzero
    /// value after a request finished would mean a leaked binding.
    pub fn live_bindings(&self) -> usize {
        self.live_bindings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn begin(&self, handle: &TenantHandle) -> Result<Box<dyn ScopedSession>, StoreError> {
        if handle.as_str().is_empty() {
            return Err(StoreError::Query("refusing to bind an empty handle".to_string()));
        }

        Ok(Box::new(MemorySession {
            handle: handle.clone(),
            partitions: Arc::clone(&self.partitions),
            staged_inserts: Vec::new(),
            staged_deletes: Vec::new(),
            _binding: BindingGuard::acquire(&self.live_bindings),
        }))
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Decrements the live-binding count when the session goes away, on every
/// exit path including panic unwinding.
struct BindingGuard {
    counter: Arc<AtomicUsize>,
}

impl BindingGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemorySession {
    handle: TenantHandle,
    partitions: Arc<RwLock<HashMap<String, Vec<DocRow>>>>,
    staged_inserts: Vec<DocRow>,
    staged_deletes: Vec<Uuid>,
    _binding: BindingGuard,
}

impl MemorySession {
    /// Committed rows of the bound partition merged with this session's
    /// staged writes (read-your-writes inside the unit of work).
    async fn visible_rows(&self) -> Vec<DocRow> {
        let partitions = self.partitions.read().await;
        let mut rows: Vec<DocRow> = partitions
            .get(self.handle.as_str())
            .map(|rows| {
                rows.iter()
                    .filter(|row| !self.staged_deletes.contains(&row.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.extend(self.staged_inserts.iter().cloned());
        rows
    }
}

#[async_trait]
impl ScopedSession for MemorySession {
    fn handle(&self) -> &TenantHandle {
        &self.handle
    }

    async fn insert_document(&mut self, doc: NewDocument) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.staged_inserts.push(DocRow {
            id,
            title: doc.title,
            body: doc.body,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_documents(&mut self) -> Result<Vec<StoredDocument>, StoreError> {
        let mut rows = self.visible_rows().await;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .map(|row| StoredDocument {
                id: row.id,
                title: row.title,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn search(&mut self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let rows = self.visible_rows().await;
        let corpus: Vec<(Uuid, String, EncryptedRecord, DateTime<Utc>)> = rows
            .into_iter()
            .map(|row| (row.id, row.body, row.title, row.created_at))
            .collect();
        Ok(rank_documents(&corpus, query, limit))
    }

    async fn delete_document(&mut self, id: Uuid) -> Result<bool, StoreError> {
        if self.staged_deletes.contains(&id) {
            return Ok(false);
        }
        if let Some(at) = self.staged_inserts.iter().position(|row| row.id == id) {
            self.staged_inserts.remove(at);
            return Ok(true);
        }
        let partitions = self.partitions.read().await;
        let exists = partitions
            .get(self.handle.as_str())
            .map(|rows| rows.iter().any(|row| row.id == id))
            .unwrap_or(false);
        drop(partitions);
        if exists {
            self.staged_deletes.push(id);
        }
        Ok(exists)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.staged_inserts.is_empty() && self.staged_deletes.is_empty() {
            return Ok(());
        }
        let mut partitions = self.partitions.write().await;
        let rows = partitions
            .entry(self.handle.as_str().to_string())
            .or_default();
        rows.retain(|row| !self.staged_deletes.contains(&row.id));
        rows.append(&mut self.staged_inserts);
        Ok(())
    }
}
