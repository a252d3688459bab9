//! Test doubles shared by the unit tests of this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sbrule_domain::{AccessRight, AccessRights, DesiredConfiguration, NamespaceId, QueueAuthorizationRuleId};
use sbrule_driver::{AccessKeys, AuthorizationRule, DriverError, LocalServiceBus, QueuesClient, ReplicationWaiter};

use crate::context::{ProviderContext, Timeouts};

pub(crate) fn desired(rights: AccessRights) -> DesiredConfiguration {
    DesiredConfiguration {
        name: "rule1".into(),
        namespace_name: "acme-ns1".into(),
        queue_name: "q1".into(),
        resource_group_name: "rg1".into(),
        rights,
    }
}

pub(crate) fn ctx() -> ProviderContext {
    ProviderContext::new("sub1", Timeouts::default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Get,
    Put,
    Delete,
    ListKeys,
    Replicate,
}

/// A [`LocalServiceBus`] that can be told to fail selected calls.
#[derive(Default)]
pub(crate) struct FlakyClient {
    inner: LocalServiceBus,
    failing: Mutex<HashSet<Op>>,
    /// Every call that reached the client, failed or not.
    pub calls: AtomicUsize,
    /// Drop `rights` from GET responses, as if `properties` were missing.
    pub strip_properties: AtomicBool,
    read_delay: Mutex<Duration>,
}

impl FlakyClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(op: Op) -> Self {
        let client = Self::new();
        client.fail(op);
        client
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Hold every GET for `delay` before answering.
    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, op: Op) -> Result<(), DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&op) {
            return Err(DriverError::RequestFailed(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl QueuesClient for FlakyClient {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn get_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
    ) -> Result<AuthorizationRule, DriverError> {
        self.check(Op::Get)?;
        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut rule = self.inner.get_authorization_rule(id).await?;
        if self.strip_properties.load(Ordering::SeqCst) {
            rule.rights = None;
        }
        Ok(rule)
    }

    async fn create_or_update_authorization_rule(
        &self,
        id: &QueueAuthorizationRuleId,
        rights: &[AccessRight],
    ) -> Result<AuthorizationRule, DriverError> {
        self.check(Op::Put)?;
        self.inner.create_or_update_authorization_rule(id, rights).await
    }

    async fn delete_authorization_rule(&self, id: &QueueAuthorizationRuleId) -> Result<(), DriverError> {
        self.check(Op::Delete)?;
        self.inner.delete_authorization_rule(id).await
    }

    async fn list_keys(&self, id: &QueueAuthorizationRuleId) -> Result<AccessKeys, DriverError> {
        self.check(Op::ListKeys)?;
        self.inner.list_keys(id).await
    }
}

#[async_trait]
impl ReplicationWaiter for FlakyClient {
    async fn wait_for_replication(&self, namespace: &NamespaceId, timeout: Duration) -> Result<(), DriverError> {
        self.check(Op::Replicate)?;
        self.inner.wait_for_replication(namespace, timeout).await
    }
}

/// Never finishes a replication wait within `.0`.
pub(crate) struct SlowWaiter(pub Duration);

#[async_trait]
impl ReplicationWaiter for SlowWaiter {
    async fn wait_for_replication(&self, _namespace: &NamespaceId, _timeout: Duration) -> Result<(), DriverError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}
