// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event tracking pipeline for the Beacon SDK.
//!
//! Submissions flow through validation filters into [`TrackingCommand`]s,
//! are durably spooled while retryable, grouped into bundles by ordered
//! boundary rules, delivered FIFO over HTTP one request at a time, and
//! reconciled back to callers through single-fire handles. Failed retryable
//! commands re-enter through the retry pipeline -- after a per-command
//! backoff delay in-process, or on the next process start from the spool.

pub mod agent;
pub mod bundle;
pub mod bundler;
pub mod client;
pub mod command;
pub mod event;
pub mod executor;
pub mod filter;
pub mod proxy;
pub mod reachability;
pub mod repository;
pub mod request;
pub mod response;
pub mod service;

#[cfg(test)]
mod testutil;

pub use agent::{AgentNotification, TrackingAgent};
pub use bundle::CommandBundle;
pub use client::{ClientState, DeliveryClient};
pub use command::{Scene, TrackHandle, TrackingCommand};
pub use event::{Event, EventName};
pub use filter::{EventFilter, RejectionFilterRule};
pub use reachability::ProbeReachability;
pub use repository::CommandRepository;
pub use request::{AppContext, AppInfo, RequestMeta, TrackRequest};
pub use response::{ResponseConsumer, TrackResponse};
pub use service::TrackingService;
