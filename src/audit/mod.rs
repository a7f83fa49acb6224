use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Append-only record of one request's terminal outcome. Written exactly
/// once per request by the outermost pipeline layer; never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub trace_id: String,
    pub tenant_handle: Option<String>,
    pub operation: String,
    pub outcome: u16,
    pub timestamp: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Production sink: structured log lines under the `carrel::audit` target,
/// so retention and shipping are a logging-pipeline concern.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "carrel::audit",
            trace_id = %event.trace_id,
            tenant = event.tenant_handle.as_deref().unwrap_or("-"),
            operation = %event.operation,
            outcome = event.outcome,
            "audit"
        );
    }
}

/// Test sink that retains events for assertions.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
