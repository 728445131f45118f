//! Latest successfully decoded snapshot, shared by all live entities

use chrono::{DateTime, Utc};
use pellematic_client::DeviceSnapshot;
use pellematic_core::RawField;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<DeviceSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new snapshot, returning whether it differs from the current one
    pub async fn replace(&self, snapshot: Arc<DeviceSnapshot>) -> bool {
        let mut current = self.current.write().await;
        let changed = !current
            .as_ref()
            .is_some_and(|existing| Arc::ptr_eq(existing, &snapshot));
        *current = Some(snapshot);
        changed
    }

    pub async fn current(&self) -> Option<Arc<DeviceSnapshot>> {
        self.current.read().await.clone()
    }

    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().await.as_ref().map(|s| s.fetched_at)
    }

    /// Current raw field, `None` when there is no snapshot or no such field
    pub async fn field(&self, component: &str, field: &str) -> Option<RawField> {
        self.current.read().await.as_ref()?.field(component, field)
    }
}
