use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use sbrule_config::Declaration;
use sbrule_domain::DesiredConfiguration;
use sbrule_driver::{QueuesClient, ReplicationWaiter};
use sbrule_store::{LifecycleEvent, ResourceData, StateStore};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::ProviderContext;
use crate::error::ResourceError;
use crate::handlers::{self, Mode};
use crate::plan::{plan, Plan};
use crate::report::{Change, Report};

/// Drives the handlers over a whole state file.
///
/// Every handler result is written back to the store before its error (if
/// any) is looked at, so an id persisted mid-operation is never lost.
pub struct Engine {
    client: Arc<dyn QueuesClient>,
    waiter: Arc<dyn ReplicationWaiter>,
    store: Arc<dyn StateStore>,
    ctx: ProviderContext,
}

impl Engine {
    pub fn new(
        client: Arc<dyn QueuesClient>,
        waiter: Arc<dyn ReplicationWaiter>,
        store: Arc<dyn StateStore>,
        ctx: ProviderContext,
    ) -> Self {
        Self { client, waiter, store, ctx }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    /// Converge the state towards `declarations`.
    ///
    /// Tracked addresses missing from `declarations` are destroyed. With
    /// `dry_run` the report lists what would change and nothing is touched.
    pub async fn apply(&self, declarations: &[Declaration], dry_run: bool) -> Result<Report, ResourceError> {
        let mut report = Report::new(dry_run);

        let mut prior: BTreeMap<String, ResourceData> = self
            .store
            .list_resources()
            .await?
            .into_iter()
            .map(|r| (r.address.clone(), r))
            .collect();
        debug!("Loaded {} tracked resources", prior.len());

        // Plan against what exists now, not what was last stored. A dry run
        // reads but does not write the refreshed records back.
        let mut unreadable: HashSet<String> = HashSet::new();
        for data in prior.values_mut() {
            let address = data.address.clone();
            match self.refresh_one(data, !dry_run).await {
                Ok(Some(change @ Change::Vanished { .. })) => report.changes.push(change),
                Ok(_) => {}
                Err(e) => {
                    unreadable.insert(address.clone());
                    collect(&address, Err(e), &mut report)?;
                }
            }
        }

        let declared: HashSet<&str> = declarations.iter().map(|d| d.address.as_str()).collect();

        // Deletes first so a rule moved to a new address does not collide.
        let orphans: Vec<String> = prior
            .keys()
            .filter(|a| !declared.contains(a.as_str()) && !unreadable.contains(a.as_str()))
            .cloned()
            .collect();
        for address in orphans {
            if let Some(data) = prior.remove(&address) {
                let result = self.destroy_one(data, dry_run, &mut report).await;
                collect(&address, result, &mut report)?;
            }
        }

        for decl in declarations {
            if unreadable.contains(&decl.address) {
                continue;
            }
            let result = self
                .apply_one(&decl.address, prior.remove(&decl.address), &decl.config, dry_run, &mut report)
                .await;
            collect(&decl.address, result, &mut report)?;
        }

        info!(
            dry_run,
            changes = report.changes.len(),
            errors = report.errors.len(),
            "Apply complete"
        );
        Ok(report)
    }

    async fn apply_one(
        &self,
        address: &str,
        prior: Option<ResourceData>,
        desired: &DesiredConfiguration,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<(), ResourceError> {
        let action = plan(prior.as_ref(), desired);
        debug!(address, %action, "Planned");

        let id = desired.rule_id(&self.ctx.subscription_id).id();
        let change = match &action {
            Plan::NoOp => return Ok(()),
            Plan::Create => Change::Created { address: address.into(), id },
            Plan::Update => Change::Updated { address: address.into(), id },
            Plan::Replace { fields } => Change::Replaced {
                address: address.into(),
                id,
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        };
        if dry_run {
            report.changes.push(change);
            return Ok(());
        }

        let known = prior.is_some();
        let mut data = prior.unwrap_or_else(|| ResourceData::new(address, desired.clone()));

        match action {
            Plan::Create => self.create(&mut data, desired, known).await?,
            Plan::Update => {
                let result = handlers::create_update(
                    self.client.as_ref(),
                    self.waiter.as_ref(),
                    &self.ctx,
                    desired,
                    Mode::Update,
                    &mut data,
                )
                .await;
                self.save(&data, true).await?;
                result?;
                self.record(LifecycleEvent::Updated {
                    id: Uuid::new_v4(),
                    at: Utc::now(),
                    address: address.into(),
                    resource_id: data.id.clone().unwrap_or_default(),
                })
                .await?;
            }
            Plan::Replace { .. } => {
                let old_id = data.id.clone().unwrap_or_default();
                let result =
                    handlers::delete(self.client.as_ref(), self.waiter.as_ref(), &self.ctx, &mut data).await;
                self.save(&data, true).await?;
                result?;
                self.record(LifecycleEvent::Deleted {
                    id: Uuid::new_v4(),
                    at: Utc::now(),
                    address: address.into(),
                    resource_id: old_id,
                })
                .await?;
                self.create(&mut data, desired, true).await?;
            }
            Plan::NoOp => {}
        }

        info!(address, "{}", change);
        report.changes.push(change);
        Ok(())
    }

    async fn create(
        &self,
        data: &mut ResourceData,
        desired: &DesiredConfiguration,
        known: bool,
    ) -> Result<(), ResourceError> {
        let result = handlers::create_update(
            self.client.as_ref(),
            self.waiter.as_ref(),
            &self.ctx,
            desired,
            Mode::New,
            data,
        )
        .await;
        self.save(data, known).await?;
        result?;
        self.record(LifecycleEvent::Created {
            id: Uuid::new_v4(),
            at: Utc::now(),
            address: data.address.clone(),
            resource_id: data.id.clone().unwrap_or_default(),
        })
        .await
    }

    /// Re-read every tracked rule.
    pub async fn refresh(&self) -> Result<Report, ResourceError> {
        let mut report = Report::new(false);
        for mut data in self.store.list_resources().await? {
            let address = data.address.clone();
            match self.refresh_one(&mut data, true).await {
                Ok(Some(change)) => report.changes.push(change),
                Ok(None) => {}
                Err(e) => collect(&address, Err(e), &mut report)?,
            }
        }
        Ok(report)
    }

    /// Read one record. Returns `None` for a record that was already absent.
    async fn refresh_one(&self, data: &mut ResourceData, persist: bool) -> Result<Option<Change>, ResourceError> {
        let Some(id) = data.id.clone() else {
            return Ok(None);
        };
        let address = data.address.clone();
        let result = handlers::read(self.client.as_ref(), &self.ctx, data).await;
        if persist {
            self.save(data, true).await?;
        }
        result?;

        if data.is_present() {
            return Ok(Some(Change::Refreshed { address, id }));
        }
        if persist {
            self.record(LifecycleEvent::Vanished {
                id: Uuid::new_v4(),
                at: Utc::now(),
                address: address.clone(),
                resource_id: id.clone(),
            })
            .await?;
        }
        Ok(Some(Change::Vanished { address, id }))
    }

    /// Track an existing rule under `address`.
    pub async fn import(&self, address: &str, raw_id: &str) -> Result<ResourceData, ResourceError> {
        if let Some(existing) = self.store.get_resource(address).await? {
            if existing.is_present() {
                return Err(ResourceError::AddressInUse(address.to_string()));
            }
        }

        let data = handlers::import(self.client.as_ref(), &self.ctx, address, raw_id).await?;
        self.save(&data, true).await?;
        self.record(LifecycleEvent::Imported {
            id: Uuid::new_v4(),
            at: Utc::now(),
            address: address.into(),
            resource_id: data.id.clone().unwrap_or_default(),
        })
        .await?;
        info!(address, id = raw_id, "Imported authorization rule");
        Ok(data)
    }

    /// Delete one tracked rule, or every tracked rule when `address` is `None`.
    pub async fn destroy(&self, address: Option<&str>) -> Result<Report, ResourceError> {
        let targets = match address {
            Some(address) => vec![self
                .store
                .get_resource(address)
                .await?
                .ok_or_else(|| ResourceError::NotFound(format!("resource address {address:?}")))?],
            None => self.store.list_resources().await?,
        };

        let mut report = Report::new(false);
        for data in targets {
            let address = data.address.clone();
            let result = self.destroy_one(data, false, &mut report).await;
            collect(&address, result, &mut report)?;
        }
        Ok(report)
    }

    async fn destroy_one(&self, mut data: ResourceData, dry_run: bool, report: &mut Report) -> Result<(), ResourceError> {
        let address = data.address.clone();
        let Some(id) = data.id.clone() else {
            if !dry_run {
                debug!(address, "Dropping record of absent resource");
                self.store.delete_resource(&address).await?;
            }
            return Ok(());
        };

        let change = Change::Deleted { address: address.clone(), id: id.clone() };
        if dry_run {
            report.changes.push(change);
            return Ok(());
        }

        let result = handlers::delete(self.client.as_ref(), self.waiter.as_ref(), &self.ctx, &mut data).await;
        if let Err(e) = result {
            self.save(&data, true).await?;
            return Err(e);
        }
        self.store.delete_resource(&address).await?;
        self.record(LifecycleEvent::Deleted {
            id: Uuid::new_v4(),
            at: Utc::now(),
            address,
            resource_id: id,
        })
        .await?;
        info!("{}", change);
        report.changes.push(change);
        Ok(())
    }

    /// Persist `data` unless it is a never-created resource nobody tracked.
    async fn save(&self, data: &ResourceData, known: bool) -> Result<(), ResourceError> {
        if known || data.is_present() {
            self.store.upsert_resource(data).await?;
        }
        Ok(())
    }

    async fn record(&self, event: LifecycleEvent) -> Result<(), ResourceError> {
        self.store.append_event(&event).await?;
        Ok(())
    }
}

/// Store failures abort the run; anything else is reported per resource.
fn collect(address: &str, result: Result<(), ResourceError>, report: &mut Report) -> Result<(), ResourceError> {
    match result {
        Ok(()) => Ok(()),
        Err(e @ ResourceError::Store(_)) => Err(e),
        Err(e) => {
            error!(address, error = %e, "Resource operation failed");
            report.errors.push(format!("{address}: {e}"));
            Ok(())
        }
    }
}
