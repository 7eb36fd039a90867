//! System health reporting and `GET /api/monitoring/health`.
//!
//! The route runs behind the standard pipeline with `allowed_methods: [GET]`:
//!
//! | Case | Status | Body |
//! |---|---|---|
//! | report available | 200 | `{success: true, health, timestamp}` |
//! | reporter failed | 500 | `{success: false, error: "Failed to get system health", timestamp}` |
//! | any other method | 405 | `{success: false, error: "Method not allowed", timestamp}` |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::kv::KeyValueStore;
use crate::method::Method;
use crate::middleware::{Chain, InMemoryMetrics, LogSink, MetricsSink, MetricsSummary, Pipeline, RouteConfig};
use crate::request::RequestContext;
use crate::response::{Response, timestamp};

pub const HEALTH_FAILURE_MESSAGE: &str = "Failed to get system health";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// The process is serving but a dependency check failed.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: BTreeMap<String, CheckStatus>,
    pub requests: MetricsSummary,
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("health report unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait HealthReporter: Send + Sync {
    async fn system_health(&self) -> Result<SystemHealth, HealthError>;
}

/// Reports uptime, request totals and the key-value store's reachability.
pub struct ProcessHealth {
    started_at: Instant,
    metrics: Arc<InMemoryMetrics>,
    kv: Arc<dyn KeyValueStore>,
}

impl ProcessHealth {
    pub fn new(metrics: Arc<InMemoryMetrics>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { started_at: Instant::now(), metrics, kv }
    }
}

#[async_trait]
impl HealthReporter for ProcessHealth {
    async fn system_health(&self) -> Result<SystemHealth, HealthError> {
        let kv = match self.kv.ping().await {
            Ok(()) => CheckStatus::Ok,
            Err(e) => {
                warn!("key-value store health check failed: {e}");
                CheckStatus::Error
            }
        };
        let status = if kv == CheckStatus::Ok { HealthStatus::Healthy } else { HealthStatus::Degraded };

        Ok(SystemHealth {
            status,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            checks: BTreeMap::from([("kv".to_owned(), kv)]),
            requests: self.metrics.summary(),
        })
    }
}

/// The handler body. A reporter failure becomes
/// [`HandlerError::Internal`] for the error layer to translate.
pub async fn report(reporter: &dyn HealthReporter) -> HandlerResult {
    let health = reporter.system_health().await.map_err(|e| {
        error!("{e}");
        HandlerError::Internal(HEALTH_FAILURE_MESSAGE.to_owned())
    })?;

    Ok(Response::json(&json!({
        "success": true,
        "health": health,
        "timestamp": timestamp(),
    })))
}

/// The fully composed health route.
pub fn route(
    reporter: Arc<dyn HealthReporter>,
    metrics: Arc<dyn MetricsSink>,
    logs: Arc<dyn LogSink>,
) -> Chain {
    Pipeline::standard(RouteConfig::new([Method::Get]), metrics, logs).handler(
        move |_ctx: RequestContext| {
            let reporter = Arc::clone(&reporter);
            async move { report(reporter.as_ref()).await }
        },
    )
}
