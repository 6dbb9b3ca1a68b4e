//! Connector error taxonomy and deterministic failure categorization.
//!
//! Every failure surfaced by the transport layer is converted into exactly one
//! [`ConnectorError`] variant. Categorization is pure and total: an
//! unrecognized failure always degrades to `Network { Unknown }` rather than
//! propagating an uncategorized failure type.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Maximum honored Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Message substrings (lowercase) indicating certificate problems.
const SSL_PATTERNS: &[&str] = &[
    "ssl",
    "certificate",
    "cert_",
    "unable_to_verify",
    "self signed",
    "self-signed",
];

/// Message substrings (lowercase) indicating a refused connection.
const CONNECTION_REFUSED_PATTERNS: &[&str] = &["econnrefused", "connection refused"];

/// Message substrings (lowercase) indicating DNS resolution failure.
const DNS_PATTERNS: &[&str] = &["getaddrinfo", "dns", "enotfound"];

/// Fieldless discriminant for [`ConnectorError`] variants.
///
/// Used for retryable-set membership in
/// [`RetryConfig`](crate::client::RetryConfig) so callers can name categories
/// without constructing full errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credential rejected (HTTP 401).
    Authentication,
    /// Resource does not exist (HTTP 404).
    NotFound,
    /// Remote service is rate limiting (HTTP 429).
    RateLimit,
    /// Remote service error (5xx or any other non-2xx).
    Server,
    /// TLS/certificate verification failure.
    Ssl,
    /// The client's own timeout elapsed.
    Timeout,
    /// Transport-level failure with no response received.
    Network,
}

/// Sub-classification for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkReason {
    /// The remote host actively refused the connection.
    ConnectionRefused,
    /// The host name could not be resolved.
    DnsFailure,
    /// Anything that matched no known pattern.
    Unknown,
}

impl NetworkReason {
    /// Returns the string representation used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection_refused",
            Self::DnsFailure => "dns_failure",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Categorized failure from a single connector call.
///
/// Constructed once per failed call and immutable afterwards. Variants carry
/// kind-specific data; exhaustive matching is required wherever errors are
/// interpreted.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// Credential rejected (HTTP 401).
    #[error("authentication rejected: {message}")]
    Authentication {
        /// Human-readable detail.
        message: String,
    },

    /// Resource does not exist (HTTP 404).
    #[error("resource not found: {message}")]
    NotFound {
        /// Human-readable detail.
        message: String,
    },

    /// Remote service is rate limiting (HTTP 429).
    #[error("rate limited: {message}")]
    RateLimit {
        /// Server-mandated wait from the Retry-After header, when present.
        retry_after: Option<Duration>,
        /// Human-readable detail.
        message: String,
    },

    /// Remote service error response.
    #[error("server error (HTTP {status}): {message}")]
    Server {
        /// The HTTP status code.
        status: u16,
        /// Human-readable detail.
        message: String,
    },

    /// TLS/certificate verification failure.
    #[error("ssl verification failed: {message}")]
    Ssl {
        /// Human-readable detail.
        message: String,
    },

    /// The client's own timeout elapsed before a response arrived.
    #[error("request timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The timeout that was in effect for the call.
        timeout: Duration,
    },

    /// Transport-level failure with no response received.
    #[error("network failure ({reason}): {message}")]
    Network {
        /// Sub-classification of the failure.
        reason: NetworkReason,
        /// Human-readable detail.
        message: String,
    },
}

impl ConnectorError {
    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a rate-limit error.
    pub fn rate_limit(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::RateLimit {
            retry_after,
            message: message.into(),
        }
    }

    /// Creates a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Creates an SSL error.
    pub fn ssl(message: impl Into<String>) -> Self {
        Self::Ssl {
            message: message.into(),
        }
    }

    /// Creates a timeout error carrying the configured timeout.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Creates a network error.
    pub fn network(reason: NetworkReason, message: impl Into<String>) -> Self {
        Self::Network {
            reason,
            message: message.into(),
        }
    }

    /// Returns the fieldless kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Server { .. } => ErrorKind::Server,
            Self::Ssl { .. } => ErrorKind::Ssl,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::Network,
        }
    }

    /// Returns true for failures that indicate the connector may be
    /// unreachable, which feed the reconnect state machine.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }

    /// Returns the server-mandated Retry-After delay for rate-limit errors.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Classifies a non-success HTTP status code into a [`ConnectorError`].
///
/// 401 → Authentication, 404 → NotFound, 429 → RateLimit (with the
/// `Retry-After` header honored when parseable), 5xx and every other non-2xx
/// → Server with the status attached.
#[must_use]
pub fn classify_status(status: u16, retry_after_header: Option<&str>) -> ConnectorError {
    match status {
        401 => ConnectorError::authentication("remote service rejected the API key (HTTP 401)"),
        404 => ConnectorError::not_found("remote service returned HTTP 404"),
        429 => {
            let retry_after = retry_after_header.and_then(parse_retry_after);
            ConnectorError::rate_limit(
                retry_after,
                "remote service returned HTTP 429 Too Many Requests",
            )
        }
        status if (500..600).contains(&status) => {
            ConnectorError::server(status, format!("remote service returned HTTP {status}"))
        }
        status => ConnectorError::server(status, format!("unexpected HTTP status {status}")),
    }
}

/// Classifies a transport-level failure (no response received) by inspecting
/// its message text case-insensitively.
///
/// Certificate patterns win over connection patterns; anything unmatched
/// degrades to `Network { Unknown }`. Timeouts are not detected here — the
/// client maps its own timeout cancellation to [`ConnectorError::Timeout`]
/// before reaching this function.
#[must_use]
pub fn classify_transport(message: &str) -> ConnectorError {
    let lowered = message.to_lowercase();

    if matches_any(&lowered, SSL_PATTERNS) {
        debug!(message, "transport failure classified as ssl");
        return ConnectorError::ssl(message.to_string());
    }
    if matches_any(&lowered, CONNECTION_REFUSED_PATTERNS) {
        return ConnectorError::network(NetworkReason::ConnectionRefused, message.to_string());
    }
    if matches_any(&lowered, DNS_PATTERNS) {
        return ConnectorError::network(NetworkReason::DnsFailure, message.to_string());
    }

    ConnectorError::network(NetworkReason::Unknown, message.to_string())
}

/// Classifies a response-decoding failure on the success path.
///
/// Preserves the SSL message heuristics (a TLS failure can surface while the
/// body is being read); everything else is `Network { Unknown }`.
#[must_use]
pub fn classify_decode(message: &str) -> ConnectorError {
    let lowered = message.to_lowercase();
    if matches_any(&lowered, SSL_PATTERNS) {
        return ConnectorError::ssl(message.to_string());
    }
    ConnectorError::network(NetworkReason::Unknown, message.to_string())
}

fn matches_any(lowered: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| lowered.contains(p))
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports both RFC 7231 formats: integer seconds (`Retry-After: 120`) and
/// HTTP-date (`Retry-After: Wed, 21 Oct 2026 07:28:00 GMT`). Returns `None`
/// for unparseable or negative values. Caps excessive values at 1 hour.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            Some(duration)
        } else {
            // Date is in the past
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Status Classification Tests ====================

    #[test]
    fn test_classify_status_401_authentication() {
        let error = classify_status(401, None);
        assert_eq!(error.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_classify_status_404_not_found() {
        let error = classify_status(404, None);
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_classify_status_429_with_numeric_retry_after() {
        let error = classify_status(429, Some("120"));
        match error {
            ConnectorError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(120)));
            }
            other => panic!("expected RateLimit, got: {other:?}"),
        }
    }

    #[test]
    fn test_classify_status_429_without_retry_after() {
        let error = classify_status(429, None);
        match error {
            ConnectorError::RateLimit { retry_after, .. } => assert!(retry_after.is_none()),
            other => panic!("expected RateLimit, got: {other:?}"),
        }
    }

    #[test]
    fn test_classify_status_429_with_garbage_retry_after() {
        let error = classify_status(429, Some("not-a-number"));
        match error {
            ConnectorError::RateLimit { retry_after, .. } => assert!(retry_after.is_none()),
            other => panic!("expected RateLimit, got: {other:?}"),
        }
    }

    #[test]
    fn test_classify_status_503_server() {
        let error = classify_status(503, None);
        match error {
            ConnectorError::Server { status, .. } => assert_eq!(status, 503),
            other => panic!("expected Server, got: {other:?}"),
        }
    }

    #[test]
    fn test_classify_status_other_non_2xx_is_server() {
        let error = classify_status(418, None);
        match error {
            ConnectorError::Server { status, message } => {
                assert_eq!(status, 418);
                assert!(message.contains("unexpected"));
            }
            other => panic!("expected Server, got: {other:?}"),
        }
    }

    // ==================== Transport Classification Tests ====================

    #[test]
    fn test_classify_transport_econnrefused() {
        let error = classify_transport("tcp connect error: ECONNREFUSED (os error 111)");
        match error {
            ConnectorError::Network { reason, .. } => {
                assert_eq!(reason, NetworkReason::ConnectionRefused);
            }
            other => panic!("expected Network, got: {other:?}"),
        }
    }

    #[test]
    fn test_classify_transport_connection_refused_spelled_out() {
        let error = classify_transport("Connection refused by peer");
        match error {
            ConnectorError::Network { reason, .. } => {
                assert_eq!(reason, NetworkReason::ConnectionRefused);
            }
            other => panic!("expected Network, got: {other:?}"),
        }
    }

    #[test]
    fn test_classify_transport_dns_patterns() {
        for message in [
            "getaddrinfo failed",
            "dns error: no record found",
            "ENOTFOUND service.local",
        ] {
            let error = classify_transport(message);
            match error {
                ConnectorError::Network { reason, .. } => {
                    assert_eq!(reason, NetworkReason::DnsFailure, "message: {message}");
                }
                other => panic!("expected Network for {message}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn test_classify_transport_ssl_patterns() {
        for message in [
            "SSL routines: wrong version",
            "invalid peer certificate",
            "CERT_UNTRUSTED",
            "UNABLE_TO_VERIFY_LEAF_SIGNATURE",
            "self signed certificate in chain",
            "self-signed cert rejected",
        ] {
            let error = classify_transport(message);
            assert_eq!(error.kind(), ErrorKind::Ssl, "message: {message}");
        }
    }

    #[test]
    fn test_classify_transport_unknown_degrades_gracefully() {
        let error = classify_transport("some entirely novel failure mode");
        match error {
            ConnectorError::Network { reason, .. } => assert_eq!(reason, NetworkReason::Unknown),
            other => panic!("expected Network, got: {other:?}"),
        }
    }

    #[test]
    fn test_classify_transport_ssl_wins_over_connection_refused() {
        // A message matching both pattern sets classifies as SSL.
        let error = classify_transport("ssl handshake aborted: connection refused");
        assert_eq!(error.kind(), ErrorKind::Ssl);
    }

    #[test]
    fn test_classify_decode_ssl_heuristics_preserved() {
        let error = classify_decode("error reading body: certificate expired");
        assert_eq!(error.kind(), ErrorKind::Ssl);
    }

    #[test]
    fn test_classify_decode_other_is_network_unknown() {
        let error = classify_decode("expected value at line 1 column 1");
        match error {
            ConnectorError::Network { reason, .. } => assert_eq!(reason, NetworkReason::Unknown),
            other => panic!("expected Network, got: {other:?}"),
        }
    }

    // ==================== Error Accessor Tests ====================

    #[test]
    fn test_is_connectivity() {
        assert!(ConnectorError::timeout(Duration::from_secs(10)).is_connectivity());
        assert!(ConnectorError::network(NetworkReason::Unknown, "x").is_connectivity());
        assert!(!ConnectorError::authentication("x").is_connectivity());
        assert!(!ConnectorError::server(503, "x").is_connectivity());
    }

    #[test]
    fn test_timeout_display_carries_configured_timeout() {
        let error = ConnectorError::timeout(Duration::from_millis(10_000));
        assert!(error.to_string().contains("10000ms"));
    }

    // ==================== parse_retry_after Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_retry_after_zero() {
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_negative() {
        assert_eq!(parse_retry_after("-5"), None);
    }

    #[test]
    fn test_parse_retry_after_invalid() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_whitespace() {
        assert_eq!(parse_retry_after("  120  "), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_retry_after_http_date_past() {
        let past_date = "Wed, 01 Jan 2020 00:00:00 GMT";
        assert_eq!(parse_retry_after(past_date), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_http_date_future() {
        let future_time = std::time::SystemTime::now() + Duration::from_secs(60);
        let future_date = httpdate::fmt_http_date(future_time);

        let duration = parse_retry_after(&future_date).unwrap();
        assert!(
            duration >= Duration::from_secs(55) && duration <= Duration::from_secs(65),
            "duration should be ~60s, got {duration:?}"
        );
    }
}
