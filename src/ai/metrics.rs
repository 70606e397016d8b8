//! Gateway Metrics Collection
//!
//! Counters for model API usage across every extraction issued through one
//! gateway. Thread-safe for concurrent extractions.
//!
//! ## Usage
//!
//! ```ignore
//! let summary = gateway.metrics();
//! tracing::debug!("{}", summary.display());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::transport::Usage;

// =============================================================================
// Metrics Collector
// =============================================================================

/// Atomic gateway counters.
///
/// Every field is a relaxed atomic; snapshots are not a consistent cut across
/// counters, which is fine for reporting.
#[derive(Debug)]
pub struct GatewayMetrics {
    start_time: Instant,
    /// Logical extraction requests
    requests: AtomicU64,
    /// Transport calls, retries included
    attempts: AtomicU64,
    /// Attempts after the first one
    retries: AtomicU64,
    /// Requests that ended in an error
    failures: AtomicU64,
    /// Responses that needed the repair pass
    repaired: AtomicU64,
    /// Acquisitions that had to wait for the rate limiter
    rate_limit_waits: AtomicU64,
    rate_limit_wait_ms: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub uptime_ms: u64,
    pub requests: u64,
    pub attempts: u64,
    pub retries: u64,
    pub failures: u64,
    pub repaired_responses: u64,
    pub rate_limit_waits: u64,
    pub rate_limit_wait_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: f64,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            repaired: AtomicU64::new(0),
            rate_limit_waits: AtomicU64::new(0),
            rate_limit_wait_ms: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one transport call; `attempt` is zero-based
    pub fn record_attempt(&self, attempt: u32) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if attempt > 0 {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repair(&self) {
        self.repaired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent waiting for the rate limiter (zero waits are ignored)
    pub fn record_rate_limit_wait(&self, waited: Duration) {
        if waited.is_zero() {
            return;
        }
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
        self.rate_limit_wait_ms
            .fetch_add(waited.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a successful transport response
    pub fn record_response(&self, usage: Option<Usage>, latency: Duration) {
        if let Some(usage) = usage {
            self.input_tokens
                .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
            self.output_tokens
                .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        }
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let input_tokens = self.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.output_tokens.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency_ms = if attempts > 0 {
            total_latency as f64 / attempts as f64
        } else {
            0.0
        };

        MetricsSummary {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            requests: self.requests.load(Ordering::Relaxed),
            attempts,
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            repaired_responses: self.repaired.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            rate_limit_wait_ms: self.rate_limit_wait_ms.load(Ordering::Relaxed),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            avg_latency_ms,
        }
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "Requests: {} ({} failed)\n\
             Transport calls: {} ({} retries)\n\
             Repaired responses: {}\n\
             Rate limit waits: {} ({:.1}s total)\n\
             Tokens: {} (input: {}, output: {})\n\
             Avg Latency: {:.0}ms",
            self.requests,
            self.failures,
            self.attempts,
            self.retries,
            self.repaired_responses,
            self.rate_limit_waits,
            self.rate_limit_wait_ms as f64 / 1000.0,
            self.total_tokens,
            self.input_tokens,
            self.output_tokens,
            self.avg_latency_ms
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
