//! HTTP client wrapper for connector API calls.
//!
//! This module provides the [`ConnectorClient`] struct which executes single
//! HTTP calls against a connector's API with bounded lifetime, producing
//! either a decoded result or a categorized [`ConnectorError`]. Retries are
//! deliberately not handled here — see [`crate::client::retry`].

use std::time::Duration;

use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::error::{
    ConnectorError, NetworkReason, classify_decode, classify_status, classify_transport,
};
use crate::connector::Connector;

/// Fixed API version path prefix for connector endpoints.
pub const API_PREFIX: &str = "api/v3";

/// User-Agent sent on every request.
pub const USER_AGENT: &str = "Comradarr/1.0";

/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed timeout for liveness probes.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect timeout for the underlying connection pool.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for a single connector API call.
///
/// The per-call timeout is enforced by an internal cancellation that fires
/// independently of any external token; whichever fires first wins.
#[derive(Debug, Default)]
pub struct RequestOptions {
    /// HTTP method (defaults to GET).
    pub method: Method,
    /// JSON request body, when present.
    pub body: Option<serde_json::Value>,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
    /// External cancellation signal (e.g. from a queue item cancel).
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options for a plain GET with defaults.
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    /// Options for a POST carrying a JSON body.
    #[must_use]
    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches an external cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// HTTP client bound to one connector.
///
/// Created once per connector and reused across calls to take advantage of
/// connection pooling. Cloning is cheap (the inner `reqwest::Client` is an
/// `Arc` internally).
#[derive(Debug, Clone)]
pub struct ConnectorClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl ConnectorClient {
    /// Creates a client for the given connector.
    ///
    /// # Errors
    ///
    /// Returns a `Network { Unknown }` error when the connector's base
    /// address is not a valid URL.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[allow(clippy::expect_used)]
    #[instrument(level = "debug", skip(connector), fields(connector_id = %connector.id))]
    pub fn new(connector: &Connector) -> Result<Self, ConnectorError> {
        // Normalize to a trailing slash so Url::join keeps any path prefix.
        let mut base = connector.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            ConnectorError::network(
                NetworkReason::Unknown,
                format!("invalid base address {:?}: {e}", connector.base_url),
            )
        })?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");

        Ok(Self {
            client,
            base_url,
            api_key: connector.api_key.clone(),
        })
    }

    /// Returns the resolved base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Executes a single API call and decodes the JSON response.
    ///
    /// Builds `{base}/api/v3/{endpoint}`, attaches the `X-Api-Key` header,
    /// JSON content negotiation, and the fixed User-Agent. The call is bounded
    /// by the configured timeout via an internal cancellation; an external
    /// token cancelling first also triggers the internal one.
    ///
    /// # Errors
    ///
    /// Every failure mode maps to exactly one [`ConnectorError`]:
    /// - non-success status → categorized by status code (Retry-After honored
    ///   on 429),
    /// - transport failure → categorized from the failure message,
    /// - internal timeout → `Timeout` with the configured timeout,
    /// - decode failure → `Ssl` when the message matches certificate
    ///   heuristics, otherwise `Network { Unknown }`.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ConnectorError> {
        let url = self.api_url(endpoint)?;
        let timeout = options.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        // Child of the external token: an external cancel propagates here,
        // while an internal timeout cancels only the child.
        let cancel = options
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);

        let mut request = self
            .client
            .request(options.method.clone(), url)
            .header("X-Api-Key", &self.api_key)
            .header(ACCEPT, "application/json");
        if let Some(body) = &options.body {
            // .json() also sets Content-Type: application/json.
            request = request.json(body);
        }

        let call = execute::<T>(request, timeout);

        tokio::select! {
            () = cancel.cancelled() => {
                debug!("request cancelled by external signal");
                Err(ConnectorError::network(
                    NetworkReason::Unknown,
                    "request cancelled",
                ))
            }
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    debug!(timeout_ms = timeout.as_millis(), "request hit internal timeout");
                    Err(ConnectorError::timeout(timeout))
                }
            },
        }
    }

    /// Lightweight liveness probe: `GET {base}/ping` (no API prefix) with a
    /// fixed 5s timeout. Reports only a boolean and never raises — used by
    /// the reconnect state machine as its probe primitive.
    #[instrument(skip(self), fields(base = %self.base_url))]
    pub async fn ping(&self) -> bool {
        let Ok(url) = self.base_url.join("ping") else {
            return false;
        };

        match tokio::time::timeout(PING_TIMEOUT, self.client.get(url).send()).await {
            Ok(Ok(response)) => {
                let alive = response.status().is_success();
                debug!(status = response.status().as_u16(), alive, "ping completed");
                alive
            }
            Ok(Err(error)) => {
                debug!(error = %error, "ping failed");
                false
            }
            Err(_) => {
                debug!(timeout_ms = PING_TIMEOUT.as_millis(), "ping timed out");
                false
            }
        }
    }

    fn api_url(&self, endpoint: &str) -> Result<Url, ConnectorError> {
        let path = format!("{API_PREFIX}/{}", endpoint.trim_start_matches('/'));
        self.base_url.join(&path).map_err(|e| {
            ConnectorError::network(
                NetworkReason::Unknown,
                format!("invalid endpoint {endpoint:?}: {e}"),
            )
        })
    }
}

/// Sends the request and decodes the response; every failure is categorized.
async fn execute<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, ConnectorError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ConnectorError::timeout(timeout)
        } else {
            classify_transport(&format!("{e:#}"))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        return Err(classify_status(status.as_u16(), retry_after.as_deref()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| classify_decode(&format!("{e:#}")))
}
