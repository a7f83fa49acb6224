use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::auth::resolver::PrincipalResolver;
use crate::codec::MetadataCodec;
use crate::config::{AppConfig, StoreBackend};
use crate::limiter::counter::{MemoryCounterStore, PgCounterStore};
use crate::limiter::RateLimiter;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::DocumentStore;
use crate::tenant::TenantBinder;

/// Shared request-pipeline dependencies. Everything is behind an `Arc`, so
/// cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<PrincipalResolver>,
    pub binder: Arc<TenantBinder>,
    pub limiter: Arc<RateLimiter>,
    pub codec: Arc<MetadataCodec>,
    pub store: Arc<dyn DocumentStore>,
    pub audit: Arc<dyn AuditSink>,
    pub search_max_limit: usize,
}

impl AppState {
    pub fn new(
        resolver: PrincipalResolver,
        binder: TenantBinder,
        limiter: RateLimiter,
        codec: MetadataCodec,
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditSink>,
        search_max_limit: usize,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            binder: Arc::new(binder),
            limiter: Arc::new(limiter),
            codec: Arc::new(codec),
            store,
            audit,
            search_max_limit,
        }
    }

    /// Wire the pipeline from configuration. Fails fast on missing key
    /// material rather than starting a server that cannot authenticate or
    /// scope anything.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let stage_timeout = Duration::from_millis(config.security.stage_timeout_ms);

        let resolver = PrincipalResolver::from_config(&config.security)
            .context("building principal resolver")?;
        let binder = TenantBinder::new(
            config.security.tenant_secret.as_bytes().to_vec(),
            stage_timeout,
        )
        .context("building tenant binder")?;
        let codec = MetadataCodec::new(&config.security.codec_root_key)
            .context("building metadata codec")?;

        let (store, limiter): (Arc<dyn DocumentStore>, RateLimiter) = match config.store.backend {
            StoreBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                let limiter = RateLimiter::new(
                    Arc::new(MemoryCounterStore::new()),
                    config.limiter.clone(),
                    stage_timeout,
                );
                (store, limiter)
            }
            StoreBackend::Postgres => {
                let store = PgStore::connect(&config.store)
                    .await
                    .context("connecting document store")?;
                let counter = PgCounterStore::new(store.pool().clone());
                let limiter =
                    RateLimiter::new(Arc::new(counter), config.limiter.clone(), stage_timeout);
                (Arc::new(store), limiter)
            }
        };

        Ok(Self::new(
            resolver,
            binder,
            limiter,
            codec,
            store,
            Arc::new(TracingAuditSink),
            config.api.search_max_limit,
        ))
    }
}
