use std::time::Duration;

use async_trait::async_trait;
use sbrule_domain::{AccessRight, NamespaceId, QueueAuthorizationRuleId};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// An authorization rule as the management API returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRule {
    /// ARM id echoed by the API.
    pub id: String,
    pub name: String,
    /// `None` when the response carried no `properties` block.
    pub rights: Option<Vec<AccessRight>>,
}

/// Secret material of an authorization rule (`listKeys`).
///
/// Field names follow the ARM wire format. The alias connection strings are
/// only present when the namespace has a disaster recovery pairing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeys {
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub secondary_key: Option<String>,
    #[serde(default)]
    pub primary_connection_string: Option<String>,
    #[serde(default)]
    pub secondary_connection_string: Option<String>,
    #[serde(default)]
    pub alias_primary_connection_string: Option<String>,
    #[serde(default)]
    pub alias_secondary_connection_string: Option<String>,
    #[serde(default)]
    pub key_name: Option<String>,
}

/// Management-plane operations on queue authorization rules.
///
/// Every method reports a missing rule as [`DriverError::NotFound`] so callers
/// can tell drift apart from failure.
#[async_trait]
pub trait QueuesClient: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn get_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
    ) -> Result<AuthorizationRule, DriverError>;

    async fn create_or_update_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
        rights: &[AccessRight],
    ) -> Result<AuthorizationRule, DriverError>;

    async fn delete_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
    ) -> Result<(), DriverError>;

    async fn list_keys(&self, id: &QueueAuthorizationRuleId) -> Result<AccessKeys, DriverError>;
}

/// Blocks until a namespace's paired (geo disaster recovery) namespace has
/// caught up with the latest change.
#[async_trait]
pub trait ReplicationWaiter: Send + Sync + 'static {
    /// Returns immediately when the namespace has no pairing. Fails with
    /// [`DriverError::Timeout`] once `timeout` elapses.
    async fn wait_for_replication(
        &self,
        namespace: &NamespaceId,
        timeout: Duration,
    ) -> Result<(), DriverError>;
}
