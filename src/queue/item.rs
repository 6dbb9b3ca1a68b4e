//! Queue item types and state definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connector::ConnectorId;

/// State of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Waiting for admission.
    Pending,
    /// Admitted and executing.
    InFlight,
    /// Completed successfully.
    Succeeded,
    /// Failed after its retry policy was exhausted.
    Failed,
    /// Removed before completion.
    Cancelled,
}

impl QueueState {
    /// Returns the persistence string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true once the item can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QueueState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid queue state: {s}")),
        }
    }
}

/// A single unit of work submitted against a connector.
///
/// Owned exclusively by the dispatcher until a terminal state, then handed to
/// the store via `mark_item_terminal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique identifier, assigned at submission.
    pub id: i64,
    /// The connector this work targets.
    pub connector_id: ConnectorId,
    /// Opaque description of the unit of work, for logs and persistence.
    pub payload: String,
    /// When the item was submitted.
    pub enqueued_at: DateTime<Utc>,
    /// Attempts consumed so far (bounded by the snapshotted retry config).
    pub attempts: u32,
    /// Current state.
    pub state: QueueState,
    /// Last error message, when failed.
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Creates a pending item enqueued now.
    #[must_use]
    pub fn new(id: i64, connector_id: ConnectorId, payload: impl Into<String>) -> Self {
        Self {
            id,
            connector_id,
            payload: payload.into(),
            enqueued_at: Utc::now(),
            attempts: 0,
            state: QueueState::Pending,
            last_error: None,
        }
    }
}
