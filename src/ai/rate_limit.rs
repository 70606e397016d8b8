//! Sliding-Window Rate Limiter
//!
//! Guarantees that no more than `max_requests` calls begin in any trailing
//! window (default: 60 calls per 60 s). Calls beyond the ceiling are delayed
//! until the oldest timestamp leaves the window, never rejected.
//!
//! This is a sliding window, not a token bucket: it bounds the count per
//! window but does not space calls evenly within it.
//!
//! The check-then-append sequence runs under a single async mutex. A waiting
//! caller keeps the lock while it sleeps, so concurrent callers queue in FIFO
//! order (tokio's mutex is fair) and cannot over-admit.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::config::RateLimitConfig;

/// Bounded list of call start times within the trailing window
#[derive(Debug)]
pub struct RateLimitWindow {
    max_requests: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateLimitWindow {
    /// A ceiling below one is raised to one; an empty window never admits anything
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            timestamps: VecDeque::with_capacity(max_requests),
        }
    }

    /// Drop timestamps that have left the trailing window
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit a call starting at `now`, or report how long until a slot frees
    pub fn try_admit(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);

        if self.timestamps.len() < self.max_requests {
            self.timestamps.push_back(now);
            return Ok(());
        }

        let wait = self
            .timestamps
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        // A zero wait means the oldest expires exactly now; the next prune drops it
        Err(wait.max(Duration::from_millis(1)))
    }

    /// Number of timestamps currently inside the window
    pub fn len_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.timestamps.len()
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
    }
}

/// Async sliding-window limiter shared by all gateway calls
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Mutex<RateLimitWindow>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            window: Mutex::new(RateLimitWindow::new(max_requests, window)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_millis(config.window_ms),
        )
    }

    /// Wait for a free slot, record the call, and return the time spent waiting
    pub async fn acquire(&self) -> Duration {
        let mut window = self.window.lock().await;
        let started = Instant::now();

        loop {
            match window.try_admit(Instant::now()) {
                Ok(()) => return started.elapsed(),
                Err(wait) => {
                    info!(
                        wait_ms = wait.as_millis() as u64,
                        in_window = window.timestamps.len(),
                        "Rate limit reached, delaying request"
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    /// Number of calls that began within the trailing window
    pub async fn in_window(&self) -> usize {
        self.window.lock().await.len_at(Instant::now())
    }

    /// Forget every recorded call
    pub async fn reset(&self) {
        self.window.lock().await.clear();
        debug!("Rate limit window reset");
    }
}
