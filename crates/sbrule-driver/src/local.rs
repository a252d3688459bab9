use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sbrule_domain::{AccessRight, NamespaceId, QueueAuthorizationRuleId};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::client::{AccessKeys, AuthorizationRule, QueuesClient, ReplicationWaiter};
use crate::error::DriverError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalRule {
    rights: Vec<AccessRight>,
    primary_key: String,
    secondary_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Inner {
    /// Rules keyed by canonical rule id.
    rules: HashMap<String, LocalRule>,
    /// Disaster recovery alias keyed by canonical namespace id.
    #[serde(default)]
    pairings: HashMap<String, String>,
}

/// A Service Bus stand-in that keeps rules in memory.
///
/// - Generates SAS keys (HMAC-SHA256 over a random seed, base64) and the
///   matching connection strings.
/// - Namespaces paired with [`LocalServiceBus::pair_namespace`] also get
///   alias connection strings.
/// - Optionally mirrors its state to a JSON file so separate CLI runs see
///   the same rules.
#[derive(Debug, Clone, Default)]
pub struct LocalServiceBus {
    inner: Arc<RwLock<Inner>>,
    path: Option<PathBuf>,
    mutations: Arc<AtomicUsize>,
    replication_waits: Arc<AtomicUsize>,
}

impl LocalServiceBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or start) a file-backed instance at `path`.
    pub fn open(path: &Path) -> Result<Self, DriverError> {
        let inner = if path.exists() {
            let bytes = std::fs::read(path)
                .map_err(|e| DriverError::Internal(format!("read {}: {}", path.display(), e)))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| DriverError::Internal(format!("decode {}: {}", path.display(), e)))?
        } else {
            Inner::default()
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            path: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    /// Give a namespace a disaster recovery alias.
    pub async fn pair_namespace(&self, namespace: &NamespaceId, alias: &str) -> Result<(), DriverError> {
        let mut guard = self.inner.write().await;
        let mut next = guard.clone();
        next.pairings.insert(namespace.id(), alias.to_string());
        self.commit(&mut guard, next)
    }

    /// Number of create, update and delete calls served.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Number of replication waits served.
    pub fn replication_waits(&self) -> usize {
        self.replication_waits.load(Ordering::SeqCst)
    }

    /// Replace the in-memory state with `next` once it is on disk.
    fn commit(&self, current: &mut Inner, next: Inner) -> Result<(), DriverError> {
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    fn persist(&self, inner: &Inner) -> Result<(), DriverError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DriverError::Internal(e.to_string()))?;
        }
        let bytes = serde_json::to_vec_pretty(inner)
            .map_err(|e| DriverError::Internal(e.to_string()))?;
        std::fs::write(path, bytes)
            .map_err(|e| DriverError::Internal(format!("write {}: {}", path.display(), e)))
    }
}

fn generate_key(id: &QueueAuthorizationRuleId, slot: &str) -> Result<String, DriverError> {
    let seed = Uuid::new_v4();
    let mut mac = HmacSha256::new_from_slice(seed.as_bytes())
        .map_err(|e| DriverError::Internal(format!("key generation: {}", e)))?;
    mac.update(id.id().as_bytes());
    mac.update(slot.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn connection_string(host: &str, id: &QueueAuthorizationRuleId, key: &str) -> String {
    format!(
        "Endpoint=sb://{}.servicebus.windows.net/;SharedAccessKeyName={};SharedAccessKey={};EntityPath={}",
        host, id.authorization_rule_name, key, id.queue_name,
    )
}

fn not_found(id: &QueueAuthorizationRuleId) -> DriverError {
    DriverError::NotFound(format!("{} does not exist", id))
}

#[async_trait]
impl QueuesClient for LocalServiceBus {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
    ) -> Result<AuthorizationRule, DriverError> {
        debug!(id = %id.id(), "LocalServiceBus: get_authorization_rule");
        let guard = self.inner.read().await;
        let rule = guard.rules.get(&id.id()).ok_or_else(|| not_found(id))?;
        Ok(AuthorizationRule {
            id: id.id(),
            name: id.authorization_rule_name.clone(),
            rights: Some(rule.rights.clone()),
        })
    }

    async fn create_or_update_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
        rights: &[AccessRight],
    ) -> Result<AuthorizationRule, DriverError> {
        debug!(id = %id.id(), ?rights, "LocalServiceBus: create_or_update_authorization_rule");
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.inner.write().await;
        let mut next = guard.clone();
        match next.rules.get_mut(&id.id()) {
            Some(rule) => rule.rights = rights.to_vec(),
            None => {
                let rule = LocalRule {
                    rights: rights.to_vec(),
                    primary_key: generate_key(id, "primary")?,
                    secondary_key: generate_key(id, "secondary")?,
                };
                next.rules.insert(id.id(), rule);
            }
        }
        self.commit(&mut guard, next)?;
        Ok(AuthorizationRule {
            id: id.id(),
            name: id.authorization_rule_name.clone(),
            rights: Some(rights.to_vec()),
        })
    }

    async fn delete_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
    ) -> Result<(), DriverError> {
        debug!(id = %id.id(), "LocalServiceBus: delete_authorization_rule");
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.inner.write().await;
        let mut next = guard.clone();
        next.rules.remove(&id.id());
        self.commit(&mut guard, next)
    }

    async fn list_keys(&self, id: &QueueAuthorizationRuleId) -> Result<AccessKeys, DriverError> {
        debug!(id = %id.id(), "LocalServiceBus: list_keys");
        let guard = self.inner.read().await;
        let rule = guard.rules.get(&id.id()).ok_or_else(|| not_found(id))?;
        let alias = guard.pairings.get(&id.namespace_id().id());

        Ok(AccessKeys {
            primary_key: Some(rule.primary_key.clone()),
            secondary_key: Some(rule.secondary_key.clone()),
            primary_connection_string: Some(connection_string(&id.namespace_name, id, &rule.primary_key)),
            secondary_connection_string: Some(connection_string(&id.namespace_name, id, &rule.secondary_key)),
            alias_primary_connection_string: alias.map(|a| connection_string(a, id, &rule.primary_key)),
            alias_secondary_connection_string: alias.map(|a| connection_string(a, id, &rule.secondary_key)),
            key_name: Some(id.authorization_rule_name.clone()),
        })
    }
}

#[async_trait]
impl ReplicationWaiter for LocalServiceBus {
    async fn wait_for_replication(
        &self,
        namespace: &NamespaceId,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        debug!(%namespace, "LocalServiceBus: wait_for_replication");
        self.replication_waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
