use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::state::{LifecycleEvent, ResourceData};
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<String, ResourceData>,
    events: Vec<LifecycleEvent>,
}

/// In-memory implementation of [`StateStore`].
///
/// All data is lost on process exit. Suitable for tests and the local client.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get_resource(&self, address: &str) -> Result<Option<ResourceData>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.resources.get(address).cloned())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceData>, StoreError> {
        let guard = self.inner.read().await;
        let mut all: Vec<ResourceData> = guard.resources.values().cloned().collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(all)
    }

    async fn upsert_resource(&self, data: &ResourceData) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.resources.insert(data.address.clone(), data.clone());
        Ok(())
    }

    async fn delete_resource(&self, address: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.resources.remove(address);
        Ok(())
    }

    async fn append_event(&self, event: &LifecycleEvent) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.events.push(event.clone());
        Ok(())
    }

    async fn list_events(
        &self,
        address: Option<&str>,
        limit: u32,
    ) -> Result<Vec<LifecycleEvent>, StoreError> {
        let guard = self.inner.read().await;
        let filtered: Vec<LifecycleEvent> = guard
            .events
            .iter()
            .filter(|ev| address.map_or(true, |a| ev.address() == a))
            .cloned()
            .collect();

        let start = filtered.len().saturating_sub(limit as usize);
        Ok(filtered[start..].to_vec())
    }
}
