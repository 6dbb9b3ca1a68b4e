//! Comradarr Core Library
//!
//! This library provides the resilience core for Comradarr's connections to
//! external media-management services ("connectors"): a categorized error
//! taxonomy, a retrying HTTP client, per-connector request queues with
//! throttled admission, and a reconnect state machine that probes offline
//! connectors back to health.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`connector`] - Connector identity, kinds, and availability status
//! - [`client`] - HTTP client, error categorization, and retry policy
//! - [`throttle`] - Named rate-limit profiles applied at queue admission
//! - [`queue`] - Per-connector FIFO dispatch with throttling and cancellation
//! - [`reconnect`] - Offline detection and exponential-backoff probing
//! - [`store`] - Persistence contracts consumed by the core
//! - [`health`] - Combined operational snapshots per connector
//! - [`config`] - Runtime tuning knobs with serde defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod connector;
pub mod health;
pub mod queue;
pub mod reconnect;
pub mod store;
pub mod throttle;

// Re-export commonly used types
pub use client::{
    ConnectorClient, ConnectorError, ErrorKind, NetworkReason, RequestOptions, RetryConfig,
    classify_status, classify_transport, parse_retry_after, retry, retry_with,
};
pub use config::{CoreConfig, ReconnectSettings, RetrySettings};
pub use connector::{Availability, Connector, ConnectorId, ConnectorKind};
pub use health::ConnectorHealth;
pub use queue::{
    DispatchError, DispatchStats, Dispatcher, QueueItem, QueueState, SubmissionHandle, UnitOfWork,
};
pub use reconnect::{
    HttpProbe, Probe, ReconnectConfig, ReconnectManager, ReconnectPhase, ReconnectState,
};
pub use store::{ConnectorStore, MemoryStore, StoreError};
pub use throttle::{DEFAULT_PROFILE_NAME, ThrottleProfile};
