//! Connector identity and availability types.
//!
//! A connector is one configured external media-management service instance.
//! Connectors are created by configuration and referenced by the queue
//! dispatcher and the reconnect state machine; their availability status is
//! mutated as a side effect of health transitions, never by callers directly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a configured connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorId(pub i64);

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The class of media-management service behind a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// Series management service.
    Series,
    /// Film management service.
    Film,
    /// Music management service.
    Music,
    /// Book management service.
    Book,
}

impl ConnectorKind {
    /// Returns the string representation used in logs and persistence.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Film => "film",
            Self::Music => "music",
            Self::Book => "book",
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current availability of a connector, as observed by health checks and the
/// reconnect state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Reachable and responding normally.
    Healthy,
    /// Reachable but showing elevated failures or latency.
    Degraded,
    /// Recent requests are failing; not yet considered offline.
    Unhealthy,
    /// Unreachable; the reconnect state machine owns recovery.
    Offline,
}

impl Availability {
    /// Returns the string representation used in logs and persistence.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "unhealthy" => Ok(Self::Unhealthy),
            "offline" => Ok(Self::Offline),
            _ => Err(format!("invalid availability status: {s}")),
        }
    }
}

/// A configured external media-management service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    /// Unique identifier.
    pub id: ConnectorId,
    /// Service class.
    pub kind: ConnectorKind,
    /// Display name.
    pub name: String,
    /// Base address, e.g. `http://localhost:8989`.
    pub base_url: String,
    /// API credential sent as `X-Api-Key`.
    pub api_key: String,
    /// Current availability status.
    pub availability: Availability,
    /// Whether queue admission is manually paused for this connector.
    pub queue_paused: bool,
    /// Named throttle profile; `None` falls back to the default profile.
    pub throttle_profile: Option<String>,
}

impl Connector {
    /// Creates a healthy, unpaused connector using the default throttle profile.
    #[must_use]
    pub fn new(
        id: ConnectorId,
        kind: ConnectorKind,
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            availability: Availability::Healthy,
            queue_paused: false,
            throttle_profile: None,
        }
    }
}
