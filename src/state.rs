//! # Application State Management
//!
//! Shared state accessed by the HTTP handlers, the middleware and every
//! telephony WebSocket actor.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: many handlers and actors hold a reference
//! - **RwLock**: many readers or one writer at a time
//!
//! Session pairs themselves are never stored here; each lives inside its own
//! actor. Only configuration and process-wide counters are shared.

use crate::config::AppConfig;
use crate::relay::pair::PairStats;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// HTTP and relay metrics
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub start_time: Instant,
}

/// Metrics collected across all HTTP requests and session pairs.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of HTTP errors since server start
    pub error_count: u64,

    /// Key: endpoint name (e.g., "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    pub relay: RelayMetrics,
}

/// Process-wide relay counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayMetrics {
    /// Telephony connections currently open
    pub active_pairs: u32,
    pub pairs_opened: u64,
    pub pairs_closed: u64,
    pub frames_to_upstream: u64,
    pub frames_to_telephony: u64,
    pub commits: u64,
    pub frames_dropped: u64,
    pub decode_errors: u64,
    pub upstream_failures: u64,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
        Ok(())
    }

    // A panicking writer only ever leaves counters behind, so poisoned locks are recovered.
    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first time we see an endpoint, a new EndpointMetric is created.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A telephony connection was accepted.
    pub fn pair_opened(&self) {
        let mut metrics = self.metrics_write();
        metrics.relay.active_pairs += 1;
        metrics.relay.pairs_opened += 1;
    }

    /// A telephony connection ended; fold the pair's counters into the totals.
    pub fn pair_closed(&self, stats: PairStats) {
        let mut metrics = self.metrics_write();
        let relay = &mut metrics.relay;
        // Underflow guard for a close without a matching open
        relay.active_pairs = relay.active_pairs.saturating_sub(1);
        relay.pairs_closed += 1;
        relay.frames_to_upstream += stats.frames_to_upstream;
        relay.frames_to_telephony += stats.frames_to_telephony;
        relay.commits += stats.commits;
        relay.frames_dropped += stats.frames_dropped;
    }

    pub fn record_decode_error(&self) {
        self.metrics_write().relay.decode_errors += 1;
    }

    pub fn record_upstream_failure(&self) {
        self.metrics_write().relay.upstream_failures += 1;
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Cloning avoids holding the lock while the response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
