//! # Application State Management
//!
//! Shared state read by HTTP handlers and updated by the relay hub and the
//! request middleware.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: many handlers (and the hub actor) hold a reference
//! - **RwLock**: many concurrent readers, or one writer
//! - **T**: the actual data being protected
//!
//! Lock poisoning only happens if a writer panicked mid-update. The counters
//! here stay meaningful in that case, so poisoned locks are recovered rather
//! than propagated.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// State shared across HTTP workers and the relay hub.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Effective configuration (read-only after startup)
    pub config: Arc<RwLock<AppConfig>>,

    /// Counters updated by middleware and the relay hub
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected since server start.
///
/// ## What is tracked:
/// - **HTTP**: request and error totals, per-endpoint timing
/// - **Relay**: live connections, chunks seen, decode failures,
///   protocol errors, broadcasts, throttled fires, failed deliveries
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    /// Currently registered WebSocket connections
    pub active_connections: usize,

    /// Audio chunks that decoded successfully
    pub chunks_ingested: u64,

    /// Of those, chunks the strategy kept for a later broadcast
    pub chunks_stored: u64,

    /// Chunks rejected before reaching the trigger
    pub decode_failures: u64,

    /// Inbound frames that were not valid protocol messages
    pub protocol_errors: u64,

    /// Fire broadcasts that completed
    pub broadcasts_sent: u64,

    /// Fire decisions dropped by the cooldown
    pub broadcasts_throttled: u64,

    /// Per-recipient deliveries that failed
    pub send_failures: u64,
}

/// Timing and error counts for one HTTP endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
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

    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record one request against its endpoint (e.g. "GET /health").
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn set_active_connections(&self, count: usize) {
        self.write_metrics().active_connections = count;
    }

    pub fn record_chunk(&self, stored: bool) {
        let mut metrics = self.write_metrics();
        metrics.chunks_ingested += 1;
        if stored {
            metrics.chunks_stored += 1;
        }
    }

    pub fn record_decode_failure(&self) {
        self.write_metrics().decode_failures += 1;
    }

    pub fn record_protocol_error(&self) {
        self.write_metrics().protocol_errors += 1;
    }

    pub fn record_broadcast(&self) {
        self.write_metrics().broadcasts_sent += 1;
    }

    pub fn record_throttled(&self) {
        self.write_metrics().broadcasts_throttled += 1;
    }

    pub fn record_send_failures(&self, count: u64) {
        self.write_metrics().send_failures += count;
    }

    /// Consistent copy of every counter, taken under one read lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
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

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
