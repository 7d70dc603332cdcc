// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for the Beacon tracking SDK.
//!
//! Provides [`CircuitBreaker`] (a failure-count + recovery-window gate that
//! callers consult before attempting a send) and [`ExponentialBackoff`]
//! (per-command retry cadence with optional jitter).

pub mod backoff;
pub mod circuit;

pub use backoff::ExponentialBackoff;
pub use circuit::CircuitBreaker;
