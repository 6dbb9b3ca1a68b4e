//! Reconnect state machine: detects unreachable connectors, suppresses
//! traffic to them, and probes for recovery with exponential backoff.
//!
//! One [`ReconnectState`] exists per connector for the lifetime of its
//! unhealthy streak. The machine is driven by an external scheduler calling
//! [`ReconnectManager::process_reconnections`] periodically; it never raises —
//! probe failures are recorded as state, not propagated as errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::client::retry::{apply_jitter, backoff_delay};
use crate::client::{ConnectorClient, ConnectorError};
use crate::connector::{Availability, Connector, ConnectorId};
use crate::store::ConnectorStore;

/// Default base delay before the first probe (30s).
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(30_000);

/// Default probe delay cap (10 minutes).
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(600_000);

/// Default backoff multiplier.
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default jitter fraction (±25%).
const DEFAULT_JITTER_FRACTION: f64 = 0.25;

/// Backoff schedule for reconnect probes.
///
/// `max_attempts = 0` means unbounded attempts at the capped delay: the
/// machine never gives up on its own, only via manual pause.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first probe.
    pub base_delay: Duration,
    /// Probe delay cap.
    pub max_delay: Duration,
    /// Multiplier applied per failed probe.
    pub multiplier: f64,
    /// Jitter fraction in `0..=1`.
    pub jitter_fraction: f64,
    /// Probe attempt bound; 0 = unbounded.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            max_attempts: 0,
        }
    }
}

/// Computes the pre-jitter delay before probe attempt `n` (1-indexed):
/// `min(max_delay, base_delay * multiplier^(n - 1))`.
#[must_use]
pub fn reconnect_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    backoff_delay(
        config.base_delay,
        config.max_delay,
        config.multiplier,
        attempt,
    )
}

/// Phase of a connector's reconnect lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPhase {
    /// Reachable; no reconnect record exists in this phase.
    Connected,
    /// Unreachable; probes are scheduled with backoff.
    Reconnecting,
    /// Manually paused; no automatic probing until resumed.
    Paused,
}

/// Per-connector reconnect bookkeeping.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    /// The connector this record tracks.
    pub connector_id: ConnectorId,
    /// Failed probe attempts so far.
    pub attempt: u32,
    /// When the next probe is due; `None` while paused.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Message from the last failure.
    pub last_error: Option<String>,
    /// Current phase.
    pub phase: ReconnectPhase,
}

/// Liveness probe primitive, injected so tests can fake connectivity.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Returns true when the connector answers a liveness check.
    async fn ping(&self, connector: &Connector) -> bool;
}

/// Default probe backed by [`ConnectorClient::ping`].
#[derive(Debug, Default)]
pub struct HttpProbe;

#[async_trait]
impl Probe for HttpProbe {
    async fn ping(&self, connector: &Connector) -> bool {
        match ConnectorClient::new(connector) {
            Ok(client) => client.ping().await,
            Err(error) => {
                debug!(connector_id = %connector.id, error = %error, "probe client build failed");
                false
            }
        }
    }
}

/// Drives reconnect state for all connectors.
///
/// Constructed at process start and injected into the dispatcher; all mutable
/// state lives in a per-connector map entry, so unrelated connectors never
/// contend.
pub struct ReconnectManager {
    config: ReconnectConfig,
    store: Arc<dyn ConnectorStore>,
    probe: Arc<dyn Probe>,
    states: DashMap<ConnectorId, ReconnectState>,
}

impl std::fmt::Debug for ReconnectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectManager")
            .field("config", &self.config)
            .field("tracked", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl ReconnectManager {
    /// Creates a manager with the given schedule, store, and probe.
    #[must_use]
    pub fn new(
        config: ReconnectConfig,
        store: Arc<dyn ConnectorStore>,
        probe: Arc<dyn Probe>,
    ) -> Self {
        Self {
            config,
            store,
            probe,
            states: DashMap::new(),
        }
    }

    /// Creates a manager probing over HTTP with the default schedule.
    #[must_use]
    pub fn with_defaults(store: Arc<dyn ConnectorStore>) -> Self {
        Self::new(ReconnectConfig::default(), store, Arc::new(HttpProbe))
    }

    /// Seeds reconnect state for a connector that has gone offline.
    ///
    /// Attempt starts at 0 and the first probe is scheduled one base delay
    /// out. A connector already tracked (Reconnecting or Paused) keeps its
    /// existing schedule; repeated failure reports must not reset backoff.
    #[instrument(skip(self))]
    pub async fn initialize_reconnect(&self, connector_id: ConnectorId, error: &ConnectorError) {
        let mut seeded = false;
        self.states.entry(connector_id).or_insert_with(|| {
            seeded = true;
            let delay = apply_jitter(reconnect_delay(&self.config, 1), self.config.jitter_fraction);
            ReconnectState {
                connector_id,
                attempt: 0,
                next_attempt_at: Some(Utc::now() + to_chrono(delay)),
                last_error: Some(error.to_string()),
                phase: ReconnectPhase::Reconnecting,
            }
        });

        if seeded {
            info!(%connector_id, error = %error, "connector entered reconnecting state");
            self.set_availability(connector_id, Availability::Offline)
                .await;
        }
    }

    /// Scans all connectors in Reconnecting state whose probe is due, issues
    /// a probe for each, and applies the resulting transition. Returns the
    /// number of probes issued.
    ///
    /// Invoked periodically by an external scheduler tick; may overlap with
    /// in-flight requests for the same connector.
    #[instrument(skip(self))]
    pub async fn process_reconnections(&self) -> usize {
        let now = Utc::now();
        let due: Vec<ConnectorId> = self
            .states
            .iter()
            .filter(|entry| {
                entry.phase == ReconnectPhase::Reconnecting
                    && entry.next_attempt_at.is_some_and(|at| at <= now)
            })
            .map(|entry| *entry.key())
            .collect();

        // Probes run concurrently; one dead connector's 5s ping timeout must
        // not delay another connector's due probe.
        join_all(
            due.iter()
                .map(|connector_id| self.probe_once(*connector_id, false)),
        )
        .await;
        due.len()
    }

    /// Forces an immediate probe outside the schedule.
    ///
    /// A successful manual probe reconnects without having perturbed the
    /// attempt counter; a failed one counts as a normal failed attempt.
    /// Returns whether the probe succeeded.
    #[instrument(skip(self))]
    pub async fn trigger_manual_reconnect(&self, connector_id: ConnectorId) -> bool {
        self.probe_once(connector_id, true).await
    }

    /// Manually pauses reconnection: no automatic probing until resumed.
    #[instrument(skip(self))]
    pub async fn pause(&self, connector_id: ConnectorId) {
        {
            let mut entry = self
                .states
                .entry(connector_id)
                .or_insert_with(|| ReconnectState {
                    connector_id,
                    attempt: 0,
                    next_attempt_at: None,
                    last_error: None,
                    phase: ReconnectPhase::Paused,
                });
            entry.phase = ReconnectPhase::Paused;
            entry.next_attempt_at = None;
        }
        info!(%connector_id, "reconnection paused");
        self.set_availability(connector_id, Availability::Offline)
            .await;
    }

    /// Resumes a paused connector: re-enters Reconnecting and schedules an
    /// immediate attempt.
    #[instrument(skip(self))]
    pub async fn resume(&self, connector_id: ConnectorId) {
        let resumed = {
            match self.states.get_mut(&connector_id) {
                Some(mut entry) if entry.phase == ReconnectPhase::Paused => {
                    entry.phase = ReconnectPhase::Reconnecting;
                    entry.next_attempt_at = Some(Utc::now());
                    true
                }
                _ => false,
            }
        };
        if resumed {
            info!(%connector_id, "reconnection resumed");
        }
    }

    /// Returns true while the connector must not admit queue items
    /// (Reconnecting or Paused).
    #[must_use]
    pub fn is_gated(&self, connector_id: ConnectorId) -> bool {
        self.states.contains_key(&connector_id)
    }

    /// Returns the current reconnect record for a connector, if any.
    #[must_use]
    pub fn state(&self, connector_id: ConnectorId) -> Option<ReconnectState> {
        self.states.get(&connector_id).map(|entry| entry.clone())
    }

    /// Issues one probe and applies the transition. `manual` probes run in
    /// any phase; scheduled probes have already been filtered to Reconnecting.
    async fn probe_once(&self, connector_id: ConnectorId, manual: bool) -> bool {
        let connector = match self.store.read_connector(connector_id).await {
            Ok(connector) => connector,
            Err(error) => {
                warn!(%connector_id, error = %error, "cannot probe unknown connector");
                return false;
            }
        };

        let alive = self.probe.ping(&connector).await;

        if alive {
            // Transition applied atomically relative to the per-connector
            // entry: removal wins over any concurrently reported failure
            // still being classified.
            self.states.remove(&connector_id);
            info!(%connector_id, manual, "probe succeeded, connector reconnected");
            self.set_availability(connector_id, Availability::Healthy)
                .await;
            return true;
        }

        let gave_up = {
            let mut entry = self
                .states
                .entry(connector_id)
                .or_insert_with(|| ReconnectState {
                    connector_id,
                    attempt: 0,
                    next_attempt_at: None,
                    last_error: None,
                    phase: ReconnectPhase::Reconnecting,
                });

            entry.attempt += 1;
            entry.last_error = Some("liveness probe failed".to_string());

            let exhausted =
                self.config.max_attempts > 0 && entry.attempt >= self.config.max_attempts;
            if exhausted {
                entry.phase = ReconnectPhase::Paused;
                entry.next_attempt_at = None;
            } else if entry.phase == ReconnectPhase::Reconnecting || manual {
                let delay = apply_jitter(
                    reconnect_delay(&self.config, entry.attempt + 1),
                    self.config.jitter_fraction,
                );
                entry.next_attempt_at = Some(Utc::now() + to_chrono(delay));
            }

            debug!(
                %connector_id,
                attempt = entry.attempt,
                next_attempt_at = ?entry.next_attempt_at,
                "probe failed"
            );
            exhausted
        };

        if gave_up {
            warn!(%connector_id, "reconnect attempts exhausted, pausing until manual resume");
        }
        self.set_availability(connector_id, Availability::Offline)
            .await;
        false
    }

    /// Availability is updated as a side effect of every transition; a store
    /// failure here is logged, never propagated.
    async fn set_availability(&self, connector_id: ConnectorId, status: Availability) {
        if let Err(error) = self.store.write_availability(connector_id, status).await {
            warn!(%connector_id, %status, error = %error, "failed to record availability");
        }
    }
}

fn to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(600))
}
