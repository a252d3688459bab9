use async_trait::async_trait;

use crate::error::StoreError;
use crate::state::{LifecycleEvent, ResourceData};

/// Persisted resource records, keyed by resource address.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get_resource(&self, address: &str) -> Result<Option<ResourceData>, StoreError>;
    async fn list_resources(&self) -> Result<Vec<ResourceData>, StoreError>;
    async fn upsert_resource(&self, data: &ResourceData) -> Result<(), StoreError>;
    async fn delete_resource(&self, address: &str) -> Result<(), StoreError>;

    async fn append_event(&self, event: &LifecycleEvent) -> Result<(), StoreError>;

    async fn list_events(
        &self,
        address: Option<&str>,
        limit: u32,
    ) -> Result<Vec<LifecycleEvent>, StoreError>;
}
