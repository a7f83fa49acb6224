use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Atomic increment-with-window primitive backing the rate limiter.
///
/// One call both increments the counter and, on first write, establishes
/// the window -- there is no separate "create bucket" step for two
/// concurrent first requests to race on.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`'s counter within the window anchored at
    /// `window_start` and return the post-increment count. A stored bucket
    /// from an earlier window is replaced, not extended.
    async fn incr(&self, key: &str, window_start: DateTime<Utc>) -> Result<u64, CounterError>;
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: DateTime<Utc>,
    count: u64,
}

/// In-process counter for single-instance deployments. Correctness across
/// multiple instances requires the shared Postgres counter instead.
#[derive(Default)]
pub struct MemoryCounterStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

// Expired buckets are pruned once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, window_start: DateTime<Utc>) -> Result<u64, CounterError> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| CounterError::Unavailable("counter lock poisoned".to_string()))?;

        if buckets.len() > PRUNE_THRESHOLD {
            buckets.retain(|_, bucket| bucket.window_start >= window_start);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            window_start,
            count: 0,
        });
        if bucket.window_start != window_start {
            bucket.window_start = window_start;
            bucket.count = 0;
        }
        bucket.count += 1;
        Ok(bucket.count)
    }
}

/// Shared counter on Postgres: the whole increment-or-rollover is one
/// statement, so concurrent requests from the same tenant serialize on the
/// row and never both observe the last slot.
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn incr(&self, key: &str, window_start: DateTime<Utc>) -> Result<u64, CounterError> {
        let row = sqlx::query(
            r#"
            INSERT INTO rate_buckets (bucket_key, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (bucket_key) DO UPDATE SET
                count = CASE
                    WHEN rate_buckets.window_start = EXCLUDED.window_start
                    THEN rate_buckets.count + 1
                    ELSE 1
                END,
                window_start = EXCLUDED.window_start
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }
}
