//! Create, read, delete and import of a single queue authorization rule.
//!
//! Every handler runs under the deadline configured for its operation and
//! mutates the caller's [`ResourceData`] in place, so whatever was persisted
//! before a failure (notably the id after a successful PUT) stays visible to
//! the caller.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use sbrule_domain::{
    AccessRights, DesiredConfiguration, ObservedState, QueueAuthorizationRuleId, RESOURCE_TYPE,
};
use sbrule_driver::{QueuesClient, ReplicationWaiter};
use sbrule_store::ResourceData;
use tracing::{debug, info, warn};

use crate::context::ProviderContext;
use crate::error::ResourceError;

/// Whether a create/update targets a rule that should not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    New,
    Update,
}

async fn with_deadline<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T, ResourceError>
where
    F: Future<Output = Result<T, ResourceError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(ResourceError::Timeout { operation, after }),
    }
}

fn parse_id(raw: &str) -> Result<QueueAuthorizationRuleId, ResourceError> {
    QueueAuthorizationRuleId::parse(raw).map_err(|source| ResourceError::InvalidId {
        id: raw.to_string(),
        source,
    })
}

async fn wait_for_replication(
    waiter: &dyn ReplicationWaiter,
    id: &QueueAuthorizationRuleId,
    timeout: Duration,
) -> Result<(), ResourceError> {
    let namespace = id.namespace_id();
    waiter
        .wait_for_replication(&namespace, timeout)
        .await
        .map_err(|source| ResourceError::Replication {
            namespace: namespace.namespace_name.clone(),
            resource_group: namespace.resource_group.clone(),
            source,
        })
}

/// Create or update the rule described by `desired`.
///
/// In [`Mode::New`] an existing rule is reported as
/// [`ResourceError::AlreadyExists`] without any mutating call. The id is
/// stored on `data` as soon as the PUT succeeds; a later replication failure
/// does not roll it back.
pub async fn create_update(
    client: &dyn QueuesClient,
    waiter: &dyn ReplicationWaiter,
    ctx: &ProviderContext,
    desired: &DesiredConfiguration,
    mode: Mode,
    data: &mut ResourceData,
) -> Result<(), ResourceError> {
    let (operation, after) = match mode {
        Mode::New => ("create", ctx.timeouts.create),
        Mode::Update => ("update", ctx.timeouts.update),
    };
    with_deadline(operation, after, create_update_inner(client, waiter, ctx, desired, mode, after, data)).await
}

async fn create_update_inner(
    client: &dyn QueuesClient,
    waiter: &dyn ReplicationWaiter,
    ctx: &ProviderContext,
    desired: &DesiredConfiguration,
    mode: Mode,
    timeout: Duration,
    data: &mut ResourceData,
) -> Result<(), ResourceError> {
    desired.validate()?;
    let id = desired.rule_id(&ctx.subscription_id);

    if mode == Mode::New {
        match client.get_authorization_rule(&id).await {
            Ok(_) => {
                return Err(ResourceError::AlreadyExists {
                    resource_type: RESOURCE_TYPE,
                    id: id.id(),
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ResourceError::api("checking for presence of existing", &id, e)),
        }
    }

    let rights = desired.rights.expand();
    debug!(id = %id.id(), ?rights, "Writing authorization rule");
    client
        .create_or_update_authorization_rule(&id, &rights)
        .await
        .map_err(|e| ResourceError::api("creating/updating", &id, e))?;

    data.id = Some(id.id());
    data.config = desired.clone();

    wait_for_replication(waiter, &id, timeout).await?;

    read_inner(client, data).await
}

/// Refresh `data` from the API.
///
/// A rule that no longer exists is not an error: the id and observed state
/// are cleared so the next plan recreates it.
pub async fn read(
    client: &dyn QueuesClient,
    ctx: &ProviderContext,
    data: &mut ResourceData,
) -> Result<(), ResourceError> {
    with_deadline("read", ctx.timeouts.read, read_inner(client, data)).await
}

async fn read_inner(client: &dyn QueuesClient, data: &mut ResourceData) -> Result<(), ResourceError> {
    let Some(raw) = data.id.clone() else {
        return Ok(());
    };
    let id = parse_id(&raw)?;

    let rule = match client.get_authorization_rule(&id).await {
        Ok(rule) => rule,
        Err(e) if e.is_not_found() => {
            warn!(id = %raw, "{} was not found - removing from state", id);
            data.mark_absent();
            return Ok(());
        }
        Err(e) => return Err(ResourceError::api("retrieving", &id, e)),
    };

    let keys = client
        .list_keys(&id)
        .await
        .map_err(|e| ResourceError::api("listing keys for", &id, e))?;

    data.config.name = id.authorization_rule_name.clone();
    data.config.namespace_name = id.namespace_name.clone();
    data.config.queue_name = id.queue_name.clone();
    data.config.resource_group_name = id.resource_group.clone();

    // A response without properties leaves the last known rights in place.
    let rights = match &rule.rights {
        Some(rights) => AccessRights::flatten(rights),
        None => data.observed.as_ref().map_or(data.config.rights, |o| o.rights),
    };
    data.config.rights = rights;

    data.observed = Some(ObservedState {
        rights,
        primary_key: keys.primary_key.unwrap_or_default(),
        secondary_key: keys.secondary_key.unwrap_or_default(),
        primary_connection_string: keys.primary_connection_string.unwrap_or_default(),
        secondary_connection_string: keys.secondary_connection_string.unwrap_or_default(),
        primary_connection_string_alias: keys.alias_primary_connection_string.unwrap_or_default(),
        secondary_connection_string_alias: keys.alias_secondary_connection_string.unwrap_or_default(),
    });
    data.last_refreshed_at = Some(Utc::now());
    Ok(())
}

/// Delete the rule and wait for the namespace to replicate the deletion.
/// The id is cleared only once both steps succeed.
pub async fn delete(
    client: &dyn QueuesClient,
    waiter: &dyn ReplicationWaiter,
    ctx: &ProviderContext,
    data: &mut ResourceData,
) -> Result<(), ResourceError> {
    let after = ctx.timeouts.delete;
    with_deadline("delete", after, delete_inner(client, waiter, after, data)).await
}

async fn delete_inner(
    client: &dyn QueuesClient,
    waiter: &dyn ReplicationWaiter,
    timeout: Duration,
    data: &mut ResourceData,
) -> Result<(), ResourceError> {
    let Some(raw) = data.id.clone() else {
        return Ok(());
    };
    let id = parse_id(&raw)?;

    client
        .delete_authorization_rule(&id)
        .await
        .map_err(|e| ResourceError::api("deleting", &id, e))?;

    wait_for_replication(waiter, &id, timeout).await?;

    info!(id = %raw, "Deleted authorization rule");
    data.mark_absent();
    Ok(())
}

/// Adopt an existing rule under `address`.
pub async fn import(
    client: &dyn QueuesClient,
    ctx: &ProviderContext,
    address: &str,
    raw_id: &str,
) -> Result<ResourceData, ResourceError> {
    with_deadline("import", ctx.timeouts.read, import_inner(client, address, raw_id)).await
}

async fn import_inner(
    client: &dyn QueuesClient,
    address: &str,
    raw_id: &str,
) -> Result<ResourceData, ResourceError> {
    let id = parse_id(raw_id)?;

    let rule = match client.get_authorization_rule(&id).await {
        Ok(rule) => rule,
        Err(e) if e.is_not_found() => return Err(ResourceError::NotFound(id.to_string())),
        Err(e) => return Err(ResourceError::api("retrieving", &id, e)),
    };

    let config = DesiredConfiguration {
        name: id.authorization_rule_name.clone(),
        namespace_name: id.namespace_name.clone(),
        queue_name: id.queue_name.clone(),
        resource_group_name: id.resource_group.clone(),
        rights: rule.rights.as_deref().map(AccessRights::flatten).unwrap_or_default(),
    };
    let mut data = ResourceData::new(address, config);
    data.id = Some(id.id());

    read_inner(client, &mut data).await?;
    if !data.is_present() {
        // Deleted between the existence check and the read.
        return Err(ResourceError::NotFound(id.to_string()));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::{desired, ctx, FlakyClient, Op, SlowWaiter};
    use sbrule_domain::AccessRight;
    use sbrule_driver::LocalServiceBus;

    fn fresh(d: &DesiredConfiguration) -> ResourceData {
        ResourceData::new("rule", d.clone())
    }

    #[tokio::test]
    async fn create_then_read_matches_declared_rights() {
        let sb = LocalServiceBus::new();
        let d = desired(AccessRights::new(true, true, false));
        let mut data = fresh(&d);

        create_update(&sb, &sb, &ctx(), &d, Mode::New, &mut data).await.unwrap();
        assert_eq!(data.id.as_deref(), Some(d.rule_id("sub1").id().as_str()));
        assert_eq!(sb.replication_waits(), 1);

        data.observed = None;
        read(&sb, &ctx(), &mut data).await.unwrap();
        let observed = data.observed.as_ref().unwrap();
        assert_eq!(observed.rights, d.rights);
        assert_eq!(data.config, d);
    }

    #[tokio::test]
    async fn create_over_existing_rule_fails_without_mutation() {
        let sb = LocalServiceBus::new();
        let d = desired(AccessRights::new(true, false, false));
        sb.create_or_update_authorization_rule(&d.rule_id("sub1"), &[AccessRight::Listen])
            .await
            .unwrap();
        let before = sb.mutations();

        let mut data = fresh(&d);
        let err = create_update(&sb, &sb, &ctx(), &d, Mode::New, &mut data).await.unwrap_err();

        match &err {
            ResourceError::AlreadyExists { resource_type, id } => {
                assert_eq!(*resource_type, "azurerm_servicebus_queue_authorization_rule");
                assert_eq!(id, &d.rule_id("sub1").id());
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(sb.mutations(), before);
        assert!(data.id.is_none());
    }

    #[tokio::test]
    async fn update_mode_skips_existence_check() {
        let sb = LocalServiceBus::new();
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        create_update(&sb, &sb, &ctx(), &d, Mode::New, &mut data).await.unwrap();

        let changed = desired(AccessRights::new(true, true, true));
        create_update(&sb, &sb, &ctx(), &changed, Mode::Update, &mut data).await.unwrap();
        assert_eq!(data.observed.unwrap().rights, AccessRights::new(true, true, true));
    }

    #[tokio::test]
    async fn invalid_rights_fail_before_any_call() {
        let client = FlakyClient::new();
        let d = desired(AccessRights::new(false, false, true));
        let mut data = fresh(&d);

        let err = create_update(&client, &client, &ctx(), &d, Mode::New, &mut data)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Validation(_)), "got: {err:?}");
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_existence_check_is_reported_with_id() {
        let client = FlakyClient::failing(Op::Get);
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);

        let err = create_update(&client, &client, &ctx(), &d, Mode::New, &mut data)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("checking for presence of existing"), "got: {msg}");
        assert!(msg.contains(&d.rule_id("sub1").id()), "got: {msg}");
    }

    #[tokio::test]
    async fn failed_create_leaves_id_unset() {
        let client = FlakyClient::failing(Op::Put);
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);

        let err = create_update(&client, &client, &ctx(), &d, Mode::New, &mut data)
            .await
            .unwrap_err();
        assert!(data.id.is_none());
        let msg = err.to_string();
        assert!(msg.starts_with("creating/updating"), "got: {msg}");
        assert!(msg.contains(&d.rule_id("sub1").id()), "got: {msg}");
    }

    #[tokio::test]
    async fn failed_update_leaves_id_unchanged() {
        let client = FlakyClient::new();
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        create_update(&client, &client, &ctx(), &d, Mode::New, &mut data).await.unwrap();
        let id = data.id.clone();

        client.fail(Op::Put);
        let changed = desired(AccessRights::new(true, true, false));
        assert!(create_update(&client, &client, &ctx(), &changed, Mode::Update, &mut data)
            .await
            .is_err());
        assert_eq!(data.id, id);
    }

    #[tokio::test]
    async fn replication_failure_keeps_persisted_id() {
        let client = FlakyClient::failing(Op::Replicate);
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);

        let err = create_update(&client, &client, &ctx(), &d, Mode::New, &mut data)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Replication { .. }), "got: {err:?}");
        let msg = err.to_string();
        assert!(msg.contains("Namespace \"acme-ns1\" / Resource Group \"rg1\""), "got: {msg}");
        assert!(data.id.is_some(), "id must survive a replication failure");
    }

    #[tokio::test]
    async fn create_is_bounded_by_its_deadline() {
        let sb = LocalServiceBus::new();
        let waiter = SlowWaiter(Duration::from_secs(5));
        let mut context = ctx();
        context.timeouts.create = Duration::from_millis(50);

        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        let err = create_update(&sb, &waiter, &context, &d, Mode::New, &mut data)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ResourceError::Timeout { operation: "create", .. }),
            "got: {err:?}"
        );
        assert!(data.id.is_some());
    }

    #[tokio::test]
    async fn delete_is_bounded_by_delete_deadline() {
        let sb = LocalServiceBus::new();
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        create_update(&sb, &sb, &ctx(), &d, Mode::New, &mut data).await.unwrap();

        let waiter = SlowWaiter(Duration::from_secs(5));
        let mut context = ctx();
        context.timeouts.delete = Duration::from_millis(50);
        context.timeouts.update = Duration::from_secs(60 * 60);
        let err = delete(&sb, &waiter, &context, &mut data).await.unwrap_err();

        assert!(
            matches!(err, ResourceError::Timeout { operation: "delete", .. }),
            "got: {err:?}"
        );
        assert_eq!(data.id, Some(d.rule_id("sub1").id()));
    }

    #[tokio::test]
    async fn read_is_bounded_by_read_deadline() {
        let client = FlakyClient::new();
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        create_update(&client, &client, &ctx(), &d, Mode::New, &mut data).await.unwrap();

        client.delay_reads(Duration::from_secs(5));
        let mut context = ctx();
        context.timeouts.read = Duration::from_millis(50);
        let err = read(&client, &context, &mut data).await.unwrap_err();

        assert!(
            matches!(err, ResourceError::Timeout { operation: "read", .. }),
            "got: {err:?}"
        );
        assert!(data.is_present());
    }

    #[tokio::test]
    async fn read_of_vanished_rule_clears_id() {
        let sb = LocalServiceBus::new();
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        data.id = Some(d.rule_id("sub1").id());
        data.observed = Some(ObservedState::default());

        read(&sb, &ctx(), &mut data).await.unwrap();
        assert!(data.id.is_none());
        assert!(data.observed.is_none());
    }

    #[tokio::test]
    async fn read_with_malformed_id_is_error() {
        let sb = LocalServiceBus::new();
        let mut data = fresh(&desired(AccessRights::new(true, false, false)));
        data.id = Some("/subscriptions/sub1/resourcegroups/rg1".into());

        let err = read(&sb, &ctx(), &mut data).await.unwrap_err();
        assert!(matches!(err, ResourceError::InvalidId { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn read_failures_name_the_operation() {
        let d = desired(AccessRights::new(true, false, false));

        for (op, prefix) in [(Op::Get, "retrieving"), (Op::ListKeys, "listing keys for")] {
            let client = FlakyClient::new();
            let mut data = fresh(&d);
            create_update(&client, &client, &ctx(), &d, Mode::New, &mut data).await.unwrap();

            client.fail(op);
            let msg = read(&client, &ctx(), &mut data).await.unwrap_err().to_string();
            assert!(msg.starts_with(prefix), "got: {msg}");
            assert!(data.id.is_some());
        }
    }

    #[tokio::test]
    async fn read_without_properties_keeps_known_rights() {
        let client = FlakyClient::new();
        let d = desired(AccessRights::new(true, true, false));
        let mut data = fresh(&d);
        create_update(&client, &client, &ctx(), &d, Mode::New, &mut data).await.unwrap();

        client.strip_properties.store(true, Ordering::SeqCst);
        read(&client, &ctx(), &mut data).await.unwrap();
        assert_eq!(data.observed.unwrap().rights, AccessRights::new(true, true, false));
    }

    #[tokio::test]
    async fn delete_twice_then_read_clears_id() {
        let sb = LocalServiceBus::new();
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        create_update(&sb, &sb, &ctx(), &d, Mode::New, &mut data).await.unwrap();
        let mut stale = data.clone();

        delete(&sb, &sb, &ctx(), &mut data).await.unwrap();
        assert!(data.id.is_none());

        // A second delete against the same id is not an error.
        delete(&sb, &sb, &ctx(), &mut stale.clone()).await.unwrap();

        read(&sb, &ctx(), &mut stale).await.unwrap();
        assert!(stale.id.is_none());
    }

    #[tokio::test]
    async fn failed_delete_leaves_id_unchanged() {
        let client = FlakyClient::new();
        let d = desired(AccessRights::new(true, false, false));
        let mut data = fresh(&d);
        create_update(&client, &client, &ctx(), &d, Mode::New, &mut data).await.unwrap();
        let id = data.id.clone();

        client.fail(Op::Delete);
        let msg = delete(&client, &client, &ctx(), &mut data).await.unwrap_err().to_string();
        assert!(msg.starts_with("deleting"), "got: {msg}");
        assert!(msg.contains(id.as_deref().unwrap()), "got: {msg}");
        assert_eq!(data.id, id);

        client.heal();
        client.fail(Op::Replicate);
        assert!(delete(&client, &client, &ctx(), &mut data).await.is_err());
        assert_eq!(data.id, id, "replication failure keeps the id");
    }

    #[tokio::test]
    async fn import_adopts_existing_rule() {
        let sb = LocalServiceBus::new();
        let id = QueueAuthorizationRuleId::new("sub1", "rg1", "ns1", "q1", "rule1");
        sb.create_or_update_authorization_rule(&id, &[AccessRight::Listen])
            .await
            .unwrap();

        let data = import(&sb, &ctx(), "imported", &id.id()).await.unwrap();
        assert_eq!(data.address, "imported");
        assert_eq!(data.id.as_deref(), Some(id.id().as_str()));
        assert_eq!(data.config.name, "rule1");
        assert_eq!(data.config.namespace_name, "ns1");
        assert_eq!(data.config.rights, AccessRights::new(true, false, false));
        assert_eq!(sb.mutations(), 1);
    }

    #[tokio::test]
    async fn import_of_missing_rule_is_not_found() {
        let sb = LocalServiceBus::new();
        let id = QueueAuthorizationRuleId::new("sub1", "rg1", "ns1", "q1", "rule1");
        let err = import(&sb, &ctx(), "imported", &id.id()).await.unwrap_err();
        assert!(matches!(err, ResourceError::NotFound(_)), "got: {err:?}");

        let err = import(&sb, &ctx(), "imported", "not-an-id").await.unwrap_err();
        assert!(matches!(err, ResourceError::InvalidId { .. }), "got: {err:?}");
    }
}
