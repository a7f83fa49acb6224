pub mod counter;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::LimiterConfig;
use crate::tenant::TenantHandle;
use self::counter::CounterStore;

/// Billing tier, read from the credential's `tier` claim. Unknown or absent
/// values get the free tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    pub fn from_claim(raw: Option<&str>) -> Self {
        match raw {
            Some("pro") => Tier::Pro,
            _ => Tier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }
}

/// Outcome of one admission check. Header values for the response are all
/// derivable from here.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl Decision {
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_seconds().max(0)
    }
}

#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("counter store unreachable: {0}")]
    Unavailable(String),
}

/// Fixed-window admission control, one bucket per tenant per window.
///
/// Counter-store outages follow the single configured policy: fail-open
/// admits with a logged warning, fail-closed denies. The policy is applied
/// here and nowhere else.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: LimiterConfig,
    stage_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: LimiterConfig, stage_timeout: Duration) -> Self {
        Self {
            store,
            config,
            stage_timeout,
        }
    }

    pub fn capacity(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.config.free_capacity,
            Tier::Pro => self.config.pro_capacity,
        }
    }

    /// Atomically consume one slot from the tenant's current window.
    ///
    /// Denial carries `reset_at` so callers can compute a wait; a denied
    /// request has no other side effects.
    pub async fn check_and_consume(
        &self,
        handle: &TenantHandle,
        tier: Tier,
    ) -> Result<Decision, LimiterError> {
        let now = Utc::now();
        let (window_start, reset_at) = self.current_window(now);
        let limit = self.capacity(tier);
        let key = format!("rate:{}", handle.as_str());

        let outcome = tokio::time::timeout(
            self.stage_timeout,
            self.store.incr(&key, window_start),
        )
        .await;

        let count = match outcome {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => return self.on_outage(e.to_string(), limit, reset_at),
            Err(_) => {
                return self.on_outage(
                    format!("timed out after {}ms", self.stage_timeout.as_millis()),
                    limit,
                    reset_at,
                )
            }
        };

        if count > limit as u64 {
            return Ok(Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
            });
        }

        Ok(Decision {
            allowed: true,
            limit,
            remaining: limit - count as u32,
            reset_at,
        })
    }

    /// Windows anchor to wall-clock multiples of the window length, so all
    /// instances agree on the boundary without coordination.
    fn current_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let window = self.config.window_secs.max(1) as i64;
        let into_window = now.timestamp().rem_euclid(window);
        let window_start = now
            - chrono::Duration::seconds(into_window)
            - chrono::Duration::nanoseconds(now.timestamp_subsec_nanos() as i64);
        (window_start, window_start + chrono::Duration::seconds(window))
    }

    fn on_outage(
        &self,
        reason: String,
        limit: u32,
        reset_at: DateTime<Utc>,
    ) -> Result<Decision, LimiterError> {
        if self.config.fail_open {
            warn!("counter store unreachable, admitting unmetered: {}", reason);
            return Ok(Decision {
                allowed: true,
                limit,
                remaining: limit,
                reset_at,
            });
        }
        Err(LimiterError::Unavailable(reason))
    }
}
