pub mod session;

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::auth::resolver::Identity;
use crate::store::DocumentStore;
use self::session::ScopedSession;

/// Opaque, fixed-length tenant partition key.
///
/// Derived one-way from the caller's subject under a server-held secret:
/// the same subject always maps to the same handle, and the handle cannot
/// be inverted without the secret. Recomputed per request, never cached
/// across requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantHandle(String);

impl TenantHandle {
    /// HMAC-SHA256(secret, subject), lowercase hex. 64 characters.
    pub fn derive(secret: &[u8], subject: &str) -> Self {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts keys of any length");
        mac.update(subject.as_bytes());
        TenantHandle(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("tenant binding rejected: {0}")]
    BindRejected(String),

    #[error("tenant binding timed out after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Opens tenant-scoped units of work.
///
/// The only way to obtain a [`ScopedSession`] is through [`TenantBinder::bind`],
/// so business code cannot construct an unscoped session. Release is the
/// session's own responsibility (drop without commit rolls back), which
/// makes it uniform across the success, error, and timeout paths.
pub struct TenantBinder {
    secret: Vec<u8>,
    stage_timeout: Duration,
}

impl TenantBinder {
    pub fn new(secret: impl Into<Vec<u8>>, stage_timeout: Duration) -> Result<Self, ScopeError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ScopeError::BindRejected(
                "tenant secret is not configured".to_string(),
            ));
        }
        Ok(Self {
            secret,
            stage_timeout,
        })
    }

    pub fn handle_for(&self, identity: &Identity) -> TenantHandle {
        TenantHandle::derive(&self.secret, &identity.subject)
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    /// Open a unit of work bound to the identity's tenant partition.
    ///
    /// If the store rejects the binding, or binding does not complete within
    /// the stage timeout, the request aborts; it never proceeds unscoped and
    /// the bind is not retried.
    pub async fn bind(
        &self,
        store: &dyn DocumentStore,
        identity: &Identity,
    ) -> Result<Box<dyn ScopedSession>, ScopeError> {
        let handle = self.handle_for(identity);
        self.bind_handle(store, handle).await
    }

    pub async fn bind_handle(
        &self,
        store: &dyn DocumentStore,
        handle: TenantHandle,
    ) -> Result<Box<dyn ScopedSession>, ScopeError> {
        let session = tokio::time::timeout(self.stage_timeout, store.begin(&handle))
            .await
            .map_err(|_| ScopeError::Timeout(self.stage_timeout.as_millis() as u64))??;

        // The store verified the binding on its side; this cross-check makes
        // a store bug fatal here rather than a silent scope widening later.
        if session.handle() != &handle {
            return Err(ScopeError::BindRejected(
                "store returned a session bound to a different handle".to_string(),
            ));
        }

        Ok(session)
    }
}
