//! One structured log entry per request.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Middleware, Next};
use crate::error::HandlerResult;
use crate::method::Method;
use crate::request::RequestContext;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub duration_ms: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("log sink unavailable: {0}")]
pub struct SinkError(pub String);

/// Destination for per-request log entries. May fail.
pub trait LogSink: Send + Sync + 'static {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError>;
}

/// Writes entries as `tracing` events at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        info!(
            request_id = %entry.request_id,
            method = %entry.method,
            path = %entry.path,
            status = entry.status,
            duration_ms = entry.duration_ms,
            "request completed"
        );
        Ok(())
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LogSink for MemoryLogSink {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

/// Emits a [`LogEntry`] with method, path, status and duration for every
/// request. A failing sink is reported and otherwise ignored.
///
/// Attaches a request id to the context if no outer layer did.
pub struct Logging {
    sink: Arc<dyn LogSink>,
}

impl Logging {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Middleware for Logging {
    async fn handle(&self, mut ctx: RequestContext, next: Next) -> HandlerResult {
        let request_id = ctx.attach_request_id(Uuid::new_v4());
        let started = Instant::now();
        let method = ctx.method();
        let path = ctx.path().to_owned();

        let result = next.run(ctx).await;

        let status = match &result {
            Ok(res) => res.status_code(),
            Err(e) => e.status(),
        };
        let entry = LogEntry {
            request_id,
            method,
            path,
            status: status.as_u16(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        if let Err(e) = self.sink.write(&entry) {
            warn!(request_id = %request_id, "{e}");
        }

        result
    }
}
