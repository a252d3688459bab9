use std::sync::Arc;

use sbrule_config::Declaration;
use sbrule_domain::{AccessRight, AccessRights, DesiredConfiguration, QueueAuthorizationRuleId};
use sbrule_driver::{LocalServiceBus, QueuesClient};
use sbrule_resource::{create_update, read, Change, Engine, Mode, ProviderContext, Timeouts};
use sbrule_store::{LifecycleEvent, RedbStore, ResourceData, StateStore};

fn context() -> ProviderContext {
    ProviderContext::new("sub1", Timeouts::default())
}

fn orders_listener() -> DesiredConfiguration {
    DesiredConfiguration {
        name: "rule1".into(),
        namespace_name: "acme-orders".into(),
        queue_name: "q1".into(),
        resource_group_name: "rg1".into(),
        rights: AccessRights::new(true, false, false),
    }
}

#[tokio::test]
async fn create_then_read_gives_rights_and_secrets() {
    let sb = LocalServiceBus::new();
    let desired = orders_listener();
    let mut data = ResourceData::new("orders", desired.clone());

    create_update(&sb, &sb, &context(), &desired, Mode::New, &mut data)
        .await
        .expect("create should succeed");
    read(&sb, &context(), &mut data).await.expect("read should succeed");

    let observed = data.observed.expect("observed state after read");
    assert!(observed.rights.listen);
    assert!(!observed.rights.send);
    assert!(!observed.rights.manage);
    assert!(!observed.primary_key.is_empty());
    assert!(!observed.secondary_key.is_empty());
    assert!(!observed.primary_connection_string.is_empty());
    assert!(!observed.secondary_connection_string.is_empty());
    assert!(observed.primary_connection_string_alias.is_empty());
}

#[tokio::test]
async fn read_of_rule_in_short_named_namespace() {
    // Ids are never re-validated on read, only parsed.
    let sb = LocalServiceBus::new();
    let id = QueueAuthorizationRuleId::new("sub1", "rg1", "ns1", "q1", "rule1");
    sb.create_or_update_authorization_rule(&id, &[AccessRight::Listen])
        .await
        .unwrap();

    let mut data = ResourceData::new("example", orders_listener());
    data.id = Some(id.id());
    read(&sb, &context(), &mut data).await.unwrap();

    assert_eq!(data.config.namespace_name, "ns1");
    let observed = data.observed.unwrap();
    assert_eq!(observed.rights, AccessRights::new(true, false, false));
    let secrets: Vec<_> = observed.secrets().into_iter().filter(|(_, v)| !v.is_empty()).collect();
    assert_eq!(secrets.len(), 4, "two keys and two connection strings");
}

#[tokio::test]
async fn paired_namespace_populates_alias_strings() {
    let sb = LocalServiceBus::new();
    let desired = orders_listener();
    sb.pair_namespace(&desired.rule_id("sub1").namespace_id(), "acme-orders-dr")
        .await
        .unwrap();

    let mut data = ResourceData::new("orders", desired.clone());
    create_update(&sb, &sb, &context(), &desired, Mode::New, &mut data).await.unwrap();

    let observed = data.observed.unwrap();
    assert!(observed.primary_connection_string_alias.contains("acme-orders-dr"));
    assert!(observed.secondary_connection_string_alias.contains("acme-orders-dr"));
}

#[tokio::test]
async fn full_lifecycle_against_persistent_state() {
    let dir = tempfile::tempdir().unwrap();
    let sb = Arc::new(LocalServiceBus::open(&dir.path().join("servicebus.json")).unwrap());
    let store = Arc::new(RedbStore::open(&dir.path().join("state.redb")).unwrap());
    let engine = Engine::new(sb.clone(), sb.clone(), store.clone(), context());

    // create
    let mut desired = orders_listener();
    let decls = vec![Declaration { address: "orders".into(), config: desired.clone() }];
    let report = engine.apply(&decls, false).await.unwrap();
    assert!(report.is_ok(), "errors: {:?}", report.errors);
    assert!(matches!(report.changes.as_slice(), [Change::Created { .. }]));

    // update in place keeps the keys
    let keys_before = store.get_resource("orders").await.unwrap().unwrap().observed.unwrap().primary_key;
    desired.rights = AccessRights::new(true, true, false);
    let decls = vec![Declaration { address: "orders".into(), config: desired.clone() }];
    let report = engine.apply(&decls, false).await.unwrap();
    assert!(matches!(report.changes.as_slice(), [Change::Updated { .. }]));
    let data = store.get_resource("orders").await.unwrap().unwrap();
    assert_eq!(data.observed.as_ref().unwrap().primary_key, keys_before);
    assert_eq!(data.config.rights, AccessRights::new(true, true, false));

    // refresh
    let report = engine.refresh().await.unwrap();
    assert!(matches!(report.changes.as_slice(), [Change::Refreshed { .. }]));

    // destroy
    let report = engine.destroy(Some("orders")).await.unwrap();
    assert!(matches!(report.changes.as_slice(), [Change::Deleted { .. }]));
    assert!(store.get_resource("orders").await.unwrap().is_none());
    assert!(sb
        .get_authorization_rule(&desired.rule_id("sub1"))
        .await
        .unwrap_err()
        .is_not_found());

    // import brings it back under a new address
    sb.create_or_update_authorization_rule(&desired.rule_id("sub1"), &[AccessRight::Send])
        .await
        .unwrap();
    let imported = engine.import("adopted", &desired.rule_id("sub1").id()).await.unwrap();
    assert_eq!(imported.config.rights, AccessRights::new(false, true, false));

    let events = store.list_events(None, 100).await.unwrap();
    assert!(matches!(events.first(), Some(LifecycleEvent::Created { .. })));
    assert!(matches!(events.last(), Some(LifecycleEvent::Imported { .. })));
}

#[tokio::test]
async fn create_over_unmanaged_rule_asks_for_import() {
    let sb = Arc::new(LocalServiceBus::new());
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbStore::open(&dir.path().join("state.redb")).unwrap());
    let engine = Engine::new(sb.clone(), sb.clone(), store, context());

    let desired = orders_listener();
    sb.create_or_update_authorization_rule(&desired.rule_id("sub1"), &[AccessRight::Listen])
        .await
        .unwrap();
    let mutations = sb.mutations();

    let report = engine
        .apply(&[Declaration { address: "orders".into(), config: desired }], false)
        .await
        .unwrap();
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("already exists"), "got: {}", report.errors[0]);
    assert!(report.errors[0].contains("azurerm_servicebus_queue_authorization_rule"));
    assert_eq!(sb.mutations(), mutations);
}
