//! Narrow persistence contracts consumed by the core.
//!
//! The core never owns storage technology; it depends only on the typed
//! read/write operations of [`ConnectorStore`]. [`MemoryStore`] is the
//! reference implementation used in tests and embedded scenarios.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::connector::{Availability, Connector, ConnectorId};
use crate::queue::{QueueItem, QueueState};
use crate::throttle::{DEFAULT_PROFILE_NAME, ThrottleProfile};

/// Errors surfaced by a store implementation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No connector with the given id exists.
    #[error("connector {0} not found")]
    ConnectorNotFound(ConnectorId),

    /// No throttle profile with the given name exists.
    #[error("throttle profile {0:?} not found")]
    ProfileNotFound(String),

    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Typed read/write contract over connector, throttle, and queue records.
#[async_trait]
pub trait ConnectorStore: Send + Sync {
    /// Reads a connector by id.
    async fn read_connector(&self, id: ConnectorId) -> Result<Connector, StoreError>;

    /// Writes a connector's availability status.
    async fn write_availability(
        &self,
        id: ConnectorId,
        status: Availability,
    ) -> Result<(), StoreError>;

    /// Reads a throttle profile by name, or the default profile when `None`.
    async fn read_throttle_profile(&self, name: Option<&str>)
    -> Result<ThrottleProfile, StoreError>;

    /// Records a newly submitted queue item.
    async fn enqueue_persisted(&self, item: &QueueItem) -> Result<(), StoreError>;

    /// Records attempt progress for an item: attempts executed so far and the
    /// most recent error, when one occurred.
    async fn record_attempt(
        &self,
        item_id: i64,
        attempts: u32,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Records a queue item reaching a terminal state.
    async fn mark_item_terminal(&self, item_id: i64, state: QueueState) -> Result<(), StoreError>;
}

/// In-memory [`ConnectorStore`] backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    connectors: DashMap<ConnectorId, Connector>,
    profiles: DashMap<String, ThrottleProfile>,
    items: DashMap<i64, QueueItem>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector.
    pub fn insert_connector(&self, connector: Connector) {
        self.connectors.insert(connector.id, connector);
    }

    /// Registers a throttle profile under its own name.
    pub fn insert_profile(&self, profile: ThrottleProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Returns a snapshot of a persisted queue item, if known.
    #[must_use]
    pub fn item(&self, item_id: i64) -> Option<QueueItem> {
        self.items.get(&item_id).map(|entry| entry.clone())
    }

    /// Returns the recorded availability for a connector, if known.
    #[must_use]
    pub fn availability(&self, id: ConnectorId) -> Option<Availability> {
        self.connectors.get(&id).map(|entry| entry.availability)
    }
}

#[async_trait]
impl ConnectorStore for MemoryStore {
    async fn read_connector(&self, id: ConnectorId) -> Result<Connector, StoreError> {
        self.connectors
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::ConnectorNotFound(id))
    }

    async fn write_availability(
        &self,
        id: ConnectorId,
        status: Availability,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .connectors
            .get_mut(&id)
            .ok_or(StoreError::ConnectorNotFound(id))?;
        entry.availability = status;
        Ok(())
    }

    async fn read_throttle_profile(
        &self,
        name: Option<&str>,
    ) -> Result<ThrottleProfile, StoreError> {
        match name {
            Some(name) => self
                .profiles
                .get(name)
                .map(|entry| entry.clone())
                .ok_or_else(|| StoreError::ProfileNotFound(name.to_string())),
            None => Ok(self
                .profiles
                .get(DEFAULT_PROFILE_NAME)
                .map_or_else(ThrottleProfile::default, |entry| entry.clone())),
        }
    }

    async fn enqueue_persisted(&self, item: &QueueItem) -> Result<(), StoreError> {
        self.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn record_attempt(
        &self,
        item_id: i64,
        attempts: u32,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::Backend(format!("unknown queue item {item_id}")))?;
        entry.attempts = attempts;
        entry.last_error = last_error.map(str::to_string);
        Ok(())
    }

    async fn mark_item_terminal(&self, item_id: i64, state: QueueState) -> Result<(), StoreError> {
        let mut entry = self
            .items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::Backend(format!("unknown queue item {item_id}")))?;
        entry.state = state;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connector::ConnectorKind;

    fn store_with_connector() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_connector(Connector::new(
            ConnectorId(7),
            ConnectorKind::Music,
            "music",
            "http://localhost:8686",
            "key",
        ));
        store
    }

    #[tokio::test]
    async fn test_read_connector_round_trip() {
        let store = store_with_connector();
        let connector = store.read_connector(ConnectorId(7)).await.unwrap();
        assert_eq!(connector.name, "music");
    }

    #[tokio::test]
    async fn test_read_connector_missing() {
        let store = MemoryStore::new();
        let result = store.read_connector(ConnectorId(99)).await;
        assert!(matches!(result, Err(StoreError::ConnectorNotFound(_))));
    }

    #[tokio::test]
    async fn test_write_availability_visible_on_read() {
        let store = store_with_connector();
        store
            .write_availability(ConnectorId(7), Availability::Offline)
            .await
            .unwrap();
        let connector = store.read_connector(ConnectorId(7)).await.unwrap();
        assert_eq!(connector.availability, Availability::Offline);
    }

    #[tokio::test]
    async fn test_profile_fallback_to_default() {
        let store = MemoryStore::new();
        let profile = store.read_throttle_profile(None).await.unwrap();
        assert_eq!(profile.name, DEFAULT_PROFILE_NAME);
    }

    #[tokio::test]
    async fn test_named_profile_missing_is_error() {
        let store = MemoryStore::new();
        let result = store.read_throttle_profile(Some("gentle")).await;
        assert!(matches!(result, Err(StoreError::ProfileNotFound(_))));
    }

    #[tokio::test]
    async fn test_record_attempt_updates_progress() {
        let store = MemoryStore::new();
        let item = QueueItem::new(5, ConnectorId(7), "refresh");
        store.enqueue_persisted(&item).await.unwrap();

        store
            .record_attempt(5, 2, Some("server error (HTTP 503)"))
            .await
            .unwrap();

        let stored = store.item(5).unwrap();
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("server error (HTTP 503)"));
    }

    #[tokio::test]
    async fn test_record_attempt_unknown_item_is_error() {
        let store = MemoryStore::new();
        let result = store.record_attempt(99, 1, None).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_stored_default_profile_overrides_builtin() {
        let store = MemoryStore::new();
        store.insert_profile(ThrottleProfile {
            requests_per_minute: 6,
            ..ThrottleProfile::default()
        });
        let profile = store.read_throttle_profile(None).await.unwrap();
        assert_eq!(profile.requests_per_minute, 6);
    }
}
