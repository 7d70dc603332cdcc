// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failure-count circuit breaker with a time-based recovery window.

use std::time::Duration;

use tokio::time::Instant;

const DEFAULT_THRESHOLD: u32 = 3;
const DEFAULT_RECOVER_AFTER: Duration = Duration::from_secs(300);

/// Blocks requests preemptively after repeated failures.
///
/// The breaker is advisory: callers consult [`can_request`](Self::can_request)
/// before attempting a send; nothing downstream enforces it. Evaluating
/// `can_request` after the recovery window has elapsed resets the counter as
/// a side effect, so a recovered breaker admits a fresh run of failures.
///
/// Uses [`tokio::time::Instant`] so the recovery window advances under
/// paused test time.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    recover_after: Duration,
    failure_count: u32,
    last_failed_at: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_RECOVER_AFTER)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recover_after: Duration) -> Self {
        Self {
            threshold,
            recover_after,
            failure_count: 0,
            last_failed_at: None,
        }
    }

    /// Whether a request may be attempted right now.
    ///
    /// Resets the breaker first when the recovery window has elapsed since
    /// the last failure.
    pub fn can_request(&mut self) -> bool {
        if let Some(at) = self.last_failed_at
            && Instant::now() > at + self.recover_after
        {
            self.reset();
        }
        self.failure_count < self.threshold
    }

    /// Record one failed attempt.
    ///
    /// The count grows past the threshold unbounded; only the comparison in
    /// `can_request` matters.
    pub fn count_failure(&mut self) {
        self.last_failed_at = Some(Instant::now());
        self.failure_count += 1;
    }

    /// Clear the breaker regardless of time.
    pub fn reset(&mut self) {
        self.last_failed_at = None;
        self.failure_count = 0;
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}
