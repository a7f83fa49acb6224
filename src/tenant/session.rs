use async_trait::async_trait;
use uuid::Uuid;

use crate::store::{NewDocument, SearchHit, StoreError, StoredDocument};
use crate::tenant::TenantHandle;

/// A unit of work bound to exactly one tenant partition.
///
/// Only [`crate::tenant::TenantBinder`] hands these out, and every document
/// operation is a method here, so data access without a bound handle is
/// unrepresentable. The handle is immutable for the session's lifetime.
///
/// Dropping a session without calling [`ScopedSession::commit`] rolls the
/// unit of work back and releases the binding. That drop path is the same
/// on success, error, and timeout, so a pooled connection can never be
/// reused while still carrying a stale tenant binding.
#[async_trait]
pub trait ScopedSession: Send {
    /// The tenant partition this session is bound to.
    fn handle(&self) -> &TenantHandle;

    /// Persist a new document in this tenant's partition.
    async fn insert_document(&mut self, doc: NewDocument) -> Result<Uuid, StoreError>;

    /// All of this tenant's documents, newest first.
    async fn list_documents(&mut self) -> Result<Vec<StoredDocument>, StoreError>;

    /// Rank this tenant's documents against `query`. Never sees rows outside
    /// the bound partition.
    async fn search(&mut self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError>;

    /// Remove one of this tenant's documents. Returns false when the id does
    /// not exist in this partition (including when it exists in another's).
    async fn delete_document(&mut self, id: Uuid) -> Result<bool, StoreError>;

    /// Make the unit of work durable and release the binding.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
