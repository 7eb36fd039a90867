//! Request timing and outcome recording.
//!
//! [`Monitoring`] measures each request and hands one [`RequestSample`] to an
//! injected [`MetricsSink`]. Sinks are shared across every in-flight request
//! and must accept concurrent appends; no ordering between requests is
//! promised.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use serde::Serialize;

use super::{Middleware, Next};
use crate::error::HandlerResult;
use crate::method::Method;
use crate::request::RequestContext;

/// How a request ended, from the server's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    /// The inner chain returned `Err` or a 5xx response.
    Failure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// One measured request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSample {
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub duration: Duration,
    pub outcome: Outcome,
}

/// Destination for request samples.
pub trait MetricsSink: Send + Sync + 'static {
    fn record(&self, sample: RequestSample);
}

// ── Monitoring layer ─────────────────────────────────────────────────────────

/// Times the inner chain and records exactly one sample per request.
///
/// Observes only: the inner result, `Ok` or `Err`, is returned unchanged. A
/// panic from the inner chain is recorded as a 500 failure and then resumed.
pub struct Monitoring {
    sink: Arc<dyn MetricsSink>,
}

impl Monitoring {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Middleware for Monitoring {
    async fn handle(&self, mut ctx: RequestContext, next: Next) -> HandlerResult {
        let started = ctx.mark_started(Instant::now());
        let method = ctx.method();
        let path = ctx.path().to_owned();

        let result = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;

        let (status, outcome) = match &result {
            Ok(Ok(res)) if res.status_code().is_server_error() => (res.status_code(), Outcome::Failure),
            Ok(Ok(res)) => (res.status_code(), Outcome::Success),
            Ok(Err(e)) => (e.status(), Outcome::Failure),
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Outcome::Failure),
        };
        self.sink.record(RequestSample {
            method,
            path,
            status: status.as_u16(),
            duration: started.elapsed(),
            outcome,
        });

        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

// ── In-memory sink ───────────────────────────────────────────────────────────

/// Aggregate view over everything an [`InMemoryMetrics`] has seen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub average_duration_ms: f64,
}

#[derive(Debug)]
struct MemoryState {
    recent: VecDeque<RequestSample>,
    total: u64,
    failures: u64,
    total_duration: Duration,
}

/// Keeps running totals plus the most recent samples.
///
/// Totals cover every request ever recorded; only the last `capacity`
/// samples are retained individually.
#[derive(Debug)]
pub struct InMemoryMetrics {
    capacity: usize,
    state: Mutex<MemoryState>,
}

impl InMemoryMetrics {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(MemoryState {
                recent: VecDeque::with_capacity(capacity),
                total: 0,
                failures: 0,
                total_duration: Duration::ZERO,
            }),
        }
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> Vec<RequestSample> {
        self.lock().recent.iter().cloned().collect()
    }

    pub fn summary(&self) -> MetricsSummary {
        let state = self.lock();
        let average_duration_ms = if state.total == 0 {
            0.0
        } else {
            state.total_duration.as_secs_f64() * 1000.0 / state.total as f64
        };
        MetricsSummary {
            total_requests: state.total,
            failed_requests: state.failures,
            average_duration_ms,
        }
    }

    // A panic while holding the lock cannot leave the counters half-written,
    // so a poisoned mutex is still safe to read.
    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, sample: RequestSample) {
        let mut state = self.lock();
        state.total += 1;
        if sample.outcome == Outcome::Failure {
            state.failures += 1;
        }
        state.total_duration += sample.duration;
        if self.capacity == 0 {
            return;
        }
        if state.recent.len() == self.capacity {
            state.recent.pop_front();
        }
        state.recent.push_back(sample);
    }
}

// ── metrics facade sink ──────────────────────────────────────────────────────

/// Forwards samples to whatever recorder is installed for the [`metrics`] crate.
///
/// - `http_requests_total` (counter) by method, path, status, outcome
/// - `http_request_duration_seconds` (histogram) by method, path
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl MetricsSink for RecorderMetrics {
    fn record(&self, sample: RequestSample) {
        metrics::counter!(
            "http_requests_total",
            "method" => sample.method.as_str(),
            "path" => sample.path.clone(),
            "status" => sample.status.to_string(),
            "outcome" => sample.outcome.as_str()
        )
        .increment(1);
        metrics::histogram!(
            "http_request_duration_seconds",
            "method" => sample.method.as_str(),
            "path" => sample.path
        )
        .record(sample.duration.as_secs_f64());
    }
}

/// Sends every sample to each wrapped sink in turn.
pub struct FanOut(pub Vec<Arc<dyn MetricsSink>>);

impl MetricsSink for FanOut {
    fn record(&self, sample: RequestSample) {
        for sink in &self.0 {
            sink.record(sample.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::HandlerError;
    use crate::middleware::Pipeline;
    use crate::response::Response;

    fn monitored(
        metrics: Arc<InMemoryMetrics>,
        outcome: Result<StatusCode, HandlerError>,
    ) -> crate::middleware::Chain {
        Pipeline::new()
            .layer(Monitoring::new(metrics))
            .handler(move |_ctx: RequestContext| {
                let outcome = outcome.clone();
                async move { outcome.map(Response::status) }
            })
    }

    #[tokio::test]
    async fn records_one_sample_per_successful_request() {
        let metrics = Arc::new(InMemoryMetrics::default());
        let chain = monitored(Arc::clone(&metrics), Ok(StatusCode::OK));

        let res = chain.call(RequestContext::new(Method::Get, "/health")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);

        let samples = metrics.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].path, "/health");
        assert_eq!(samples[0].method, Method::Get);
        assert_eq!(samples[0].status, 200);
        assert_eq!(samples[0].outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn records_failures_and_forwards_the_error() {
        let metrics = Arc::new(InMemoryMetrics::default());
        let chain = monitored(
            Arc::clone(&metrics),
            Err(HandlerError::Internal("boom".into())),
        );

        let err = chain.call(RequestContext::new(Method::Get, "/")).await.unwrap_err();
        assert_eq!(err, HandlerError::Internal("boom".into()));

        let samples = metrics.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].status, 500);
        assert_eq!(samples[0].outcome, Outcome::Failure);
    }

    #[tokio::test]
    async fn server_error_responses_count_as_failures() {
        let metrics = Arc::new(InMemoryMetrics::default());
        let chain = monitored(Arc::clone(&metrics), Ok(StatusCode::BAD_GATEWAY));

        chain.call(RequestContext::new(Method::Get, "/")).await.unwrap();

        assert_eq!(metrics.summary().failed_requests, 1);
    }

    #[tokio::test]
    async fn client_errors_count_as_successes() {
        let metrics = Arc::new(InMemoryMetrics::default());
        let chain = monitored(Arc::clone(&metrics), Ok(StatusCode::BAD_REQUEST));

        chain.call(RequestContext::new(Method::Get, "/")).await.unwrap();

        assert_eq!(metrics.samples()[0].outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn panics_are_recorded_then_propagated() {
        let metrics = Arc::new(InMemoryMetrics::default());
        let chain = Pipeline::new()
            .layer(Monitoring::new(metrics.clone()))
            .handler(|_ctx: RequestContext| async {
                if true {
                    panic!("handler bug");
                }
                Ok::<_, HandlerError>(Response::status(StatusCode::OK))
            });

        let joined = tokio::spawn(chain.call(RequestContext::new(Method::Get, "/boom"))).await;
        assert!(joined.unwrap_err().is_panic());

        let samples = metrics.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].path, "/boom");
        assert_eq!(samples[0].status, 500);
        assert_eq!(samples[0].outcome, Outcome::Failure);
    }

    #[test]
    fn keeps_totals_beyond_capacity() {
        let metrics = InMemoryMetrics::with_capacity(2);
        for i in 0..5u64 {
            metrics.record(RequestSample {
                method: Method::Get,
                path: format!("/{i}"),
                status: 200,
                duration: Duration::from_millis(10),
                outcome: Outcome::Success,
            });
        }

        let paths: Vec<_> = metrics.samples().into_iter().map(|s| s.path).collect();
        assert_eq!(paths, vec!["/3", "/4"]);

        let summary = metrics.summary();
        assert_eq!(summary.total_requests, 5);
        assert_eq!(summary.failed_requests, 0);
        assert!((summary.average_duration_ms - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn concurrent_requests_are_all_recorded() {
        let metrics = Arc::new(InMemoryMetrics::default());
        let chain = Arc::new(monitored(Arc::clone(&metrics), Ok(StatusCode::OK)));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let chain = Arc::clone(&chain);
            tasks.spawn(async move { chain.call(RequestContext::new(Method::Get, "/")).await });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }

        assert_eq!(metrics.summary().total_requests, 32);
    }

    #[test]
    fn fan_out_reaches_every_sink() {
        let a = Arc::new(InMemoryMetrics::default());
        let b = Arc::new(InMemoryMetrics::default());
        let sinks: Vec<Arc<dyn MetricsSink>> = vec![a.clone(), b.clone()];
        let fan = FanOut(sinks);

        fan.record(RequestSample {
            method: Method::Post,
            path: "/".into(),
            status: 201,
            duration: Duration::ZERO,
            outcome: Outcome::Success,
        });

        assert_eq!(a.summary().total_requests, 1);
        assert_eq!(b.summary().total_requests, 1);
    }
}
