//! Resilient HTTP client layer for connector APIs.
//!
//! Three pieces, leaves first:
//! - [`error`] — the closed error taxonomy and pure categorization rules
//! - [`retry`] — bounded re-execution with exponential backoff and jitter
//! - [`http`] — the [`ConnectorClient`] request/ping plumbing
//!
//! The client itself never retries; callers wrap [`ConnectorClient::request`]
//! with [`retry::retry`] under a [`RetryConfig`] of their choosing.

pub mod error;
pub mod http;
pub mod retry;

pub use error::{
    ConnectorError, ErrorKind, NetworkReason, classify_decode, classify_status, classify_transport,
    parse_retry_after,
};
pub use http::{
    API_PREFIX, ConnectorClient, DEFAULT_REQUEST_TIMEOUT, PING_TIMEOUT, RequestOptions, USER_AGENT,
};
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryConfig, apply_jitter, backoff_delay, retry, retry_with};
