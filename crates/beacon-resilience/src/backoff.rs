// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with optional jitter.

use std::time::Duration;

use beacon_core::BeaconError;
use serde::{Deserialize, Serialize};

/// Computes the delay before the next retry attempt.
///
/// Attached per command so each command's retry cadence is independent. The
/// configuration fields are serialized alongside the command payload; the
/// attempt counter is not, so a command resurrected from the durable store
/// starts a fresh retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    /// Base delay in seconds for the first attempt.
    interval: f64,
    /// Jitter amplitude. Each delay is scaled by a factor drawn uniformly
    /// from `[1 - random_factor, 1 + random_factor]`; 0 disables jitter.
    random_factor: f64,
    /// Per-attempt growth factor.
    multiplier: u32,
    /// Attempts allowed before [`next_delay`](Self::next_delay) refuses.
    max_count: u32,
    #[serde(skip)]
    count: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(1.0, 0.25, 2, 3)
    }
}

impl ExponentialBackoff {
    pub fn new(interval: f64, random_factor: f64, multiplier: u32, max_count: u32) -> Self {
        Self {
            interval,
            random_factor,
            multiplier,
            max_count,
            count: 0,
        }
    }

    /// The next retry delay, or [`BeaconError::RetryExhausted`] once the
    /// attempt budget is used up.
    pub fn next_delay(&mut self) -> Result<Duration, BeaconError> {
        self.count += 1;

        if self.count > self.max_count {
            return Err(BeaconError::RetryExhausted);
        }

        let next_interval = self.interval * f64::from(self.multiplier).powi(self.count as i32 - 1);
        let factor = if self.random_factor == 0.0 {
            1.0
        } else {
            (rand::random::<f64>() * 2.0 * self.random_factor) + 1.0 - self.random_factor
        };

        Ok(Duration::from_secs_f64(next_interval * factor))
    }

    pub fn attempt_count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_delays_without_jitter() {
        let mut backoff = ExponentialBackoff::new(0.5, 0.0, 4, 6);
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(32));
    }

    #[test]
    fn exhausts_after_max_count() {
        let mut backoff = ExponentialBackoff::new(0.5, 0.0, 4, 2);
        assert!(backoff.next_delay().is_ok());
        assert!(backoff.next_delay().is_ok());
        assert!(matches!(
            backoff.next_delay(),
            Err(BeaconError::RetryExhausted)
        ));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut backoff = ExponentialBackoff::new(1.0, 0.25, 2, 100);
        for attempt in 0..10u32 {
            let delay = backoff.next_delay().unwrap().as_secs_f64();
            let base = 2f64.powi(attempt as i32);
            assert!(delay >= base * 0.75 && delay <= base * 1.25, "delay {delay} out of bounds for base {base}");
        }
    }

    #[test]
    fn attempt_counter_not_serialized() {
        let mut backoff = ExponentialBackoff::new(0.5, 0.0, 4, 6);
        backoff.next_delay().unwrap();
        backoff.next_delay().unwrap();
        assert_eq!(backoff.attempt_count(), 2);

        let json = serde_json::to_string(&backoff).unwrap();
        let restored: ExponentialBackoff = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.attempt_count(), 0, "counter resets across round-trips");
        // Restored configuration is intact.
        let mut restored = restored;
        assert_eq!(restored.next_delay().unwrap(), Duration::from_millis(500));
    }
}
