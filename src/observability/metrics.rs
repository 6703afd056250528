//! Metrics collection and exposition.
//!
//! # Metrics
//! - `intake_requests_total` (counter): requests by method, status
//! - `intake_request_duration_seconds` (histogram): latency distribution
//! - `intake_rate_limited_total` (counter): rejected by the rate limiter
//! - `intake_cache_events_total` (counter): hit / miss / store / invalidate
//! - `intake_sessions_created_total` (counter)
//! - `intake_csrf_rejected_total` (counter)
//! - `intake_sweep_removed_total` (counter): entries removed per sweep task
//!
//! # Design Decisions
//! - The recorder is an owned instance, never installed globally; every
//!   update runs under `metrics::with_local_recorder`
//! - One `Metrics` per Pipeline; `/metrics` renders that instance only

use std::fmt;
use std::time::Instant;

use metrics::{counter, histogram, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

/// Outcome of a response cache lookup or mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Hit,
    Miss,
    Store,
    Invalidate,
}

impl CacheEvent {
    fn as_str(self) -> &'static str {
        match self {
            CacheEvent::Hit => "hit",
            CacheEvent::Miss => "miss",
            CacheEvent::Store => "store",
            CacheEvent::Invalidate => "invalidate",
        }
    }
}

/// Explicit metrics collector owned by the request pipeline.
pub struct Metrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Metrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self { recorder, handle }
    }

    pub fn record_request(&self, method: &str, status: u16, start: Instant) {
        let method = method.to_string();
        let status = status.to_string();
        let elapsed = start.elapsed().as_secs_f64();
        with_local_recorder(&self.recorder, || {
            counter!("intake_requests_total", "method" => method, "status" => status).increment(1);
            histogram!("intake_request_duration_seconds").record(elapsed);
        });
    }

    pub fn record_rate_limited(&self) {
        with_local_recorder(&self.recorder, || {
            counter!("intake_rate_limited_total").increment(1);
        });
    }

    pub fn record_cache(&self, event: CacheEvent) {
        with_local_recorder(&self.recorder, || {
            counter!("intake_cache_events_total", "result" => event.as_str()).increment(1);
        });
    }

    pub fn record_session_created(&self) {
        with_local_recorder(&self.recorder, || {
            counter!("intake_sessions_created_total").increment(1);
        });
    }

    pub fn record_csrf_rejected(&self) {
        with_local_recorder(&self.recorder, || {
            counter!("intake_csrf_rejected_total").increment(1);
        });
    }

    pub fn record_sweep(&self, task: &'static str, removed: u64) {
        with_local_recorder(&self.recorder, || {
            counter!("intake_sweep_removed_total", "task" => task).increment(removed);
        });
    }

    /// Render all series in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.run_upkeep();
        self.handle.render()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
