//! Point-in-time health snapshots combining store, queue, and reconnect state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connector::{Availability, ConnectorId};
use crate::queue::{DispatchStats, Dispatcher};
use crate::reconnect::ReconnectPhase;
use crate::store::StoreError;

/// Snapshot of one connector's operational state.
///
/// Assembled on demand from the three sources of truth: availability from the
/// store, queue counters from the dispatcher, and probing progress from the
/// reconnect state machine. Never cached.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorHealth {
    /// The connector this snapshot describes.
    pub connector_id: ConnectorId,
    /// Recorded availability status.
    pub availability: Availability,
    /// Items waiting for admission.
    pub queue_depth: usize,
    /// Whether the queue is manually paused.
    pub queue_paused: bool,
    /// Queue counters, when a worker exists.
    pub stats: Option<DispatchStats>,
    /// Whether admission is gated by the reconnect state machine.
    pub reconnecting: bool,
    /// Failed probe attempts in the current streak.
    pub reconnect_attempt: Option<u32>,
    /// When the next probe is due.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Dispatcher {
    /// Builds a health snapshot for a connector.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectorNotFound`] for an unknown connector.
    pub async fn health(&self, connector_id: ConnectorId) -> Result<ConnectorHealth, StoreError> {
        let connector = self.store().read_connector(connector_id).await?;
        let stats = self.stats(connector_id);
        let reconnect = self.reconnect().state(connector_id);

        Ok(ConnectorHealth {
            connector_id,
            availability: connector.availability,
            queue_depth: stats.as_ref().map_or(0, |s| s.depth),
            queue_paused: stats.as_ref().map_or(connector.queue_paused, |s| s.paused),
            stats,
            reconnecting: reconnect
                .as_ref()
                .is_some_and(|state| state.phase != ReconnectPhase::Connected),
            reconnect_attempt: reconnect.as_ref().map(|state| state.attempt),
            next_attempt_at: reconnect.and_then(|state| state.next_attempt_at),
        })
    }
}
