use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sbrule_config::{load_declarations, ProviderSettings};
use sbrule_driver::{
    AzureServiceBusClient, AzureServiceBusConfig, LocalServiceBus, QueuesClient, ReplicationWaiter,
};
use sbrule_resource::{Engine, ProviderContext, Report, Timeouts};
use sbrule_store::{RedbStore, StateStore};
use tracing::debug;

use crate::cli::{Cli, CloudArg};
use crate::output;

/// Subscription used by the local Service Bus when none is configured.
const LOCAL_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Where commands read state from and which Service Bus they talk to.
pub struct Target {
    cloud: CloudArg,
    state: PathBuf,
    /// Provider settings given as flags or environment variables.
    flags: ProviderSettings,
}

impl Target {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            cloud: cli.cloud,
            state: cli.state.clone(),
            flags: ProviderSettings {
                subscription_id: cli.subscription_id.clone(),
                tenant_id: cli.tenant_id.clone(),
                client_id: cli.client_id.clone(),
                client_secret: cli.client_secret.clone(),
                ..Default::default()
            },
        }
    }

    fn open_store(&self) -> Result<Arc<RedbStore>> {
        let store = RedbStore::open(&self.state)
            .with_context(|| format!("Failed to open state at {}", self.state.display()))?;
        Ok(Arc::new(store))
    }

    /// Build an engine. Flags win over the provider block of a declaration file.
    fn engine(&self, file_settings: Option<ProviderSettings>) -> Result<Engine> {
        let mut settings = self.flags.clone();
        if let Some(file) = file_settings {
            settings.merge(file);
        }
        let timeouts = Timeouts::from_settings(&settings.timeouts);
        let store: Arc<dyn StateStore> = self.open_store()?;

        let (client, waiter, subscription_id): (Arc<dyn QueuesClient>, Arc<dyn ReplicationWaiter>, String) =
            match self.cloud {
                CloudArg::Local => {
                    let path = self.state.with_file_name("servicebus.json");
                    debug!("Using local Service Bus at {}", path.display());
                    let sb = Arc::new(
                        LocalServiceBus::open(&path)
                            .with_context(|| format!("Failed to open {}", path.display()))?,
                    );
                    let subscription_id = settings
                        .subscription_id
                        .unwrap_or_else(|| LOCAL_SUBSCRIPTION.to_string());
                    let queues: Arc<dyn QueuesClient> = sb.clone();
                    let waiter: Arc<dyn ReplicationWaiter> = sb;
                    (queues, waiter, subscription_id)
                }
                CloudArg::Azure => {
                    let subscription_id = settings.subscription_id.context(
                        "--subscription-id (or SBRULE_SUBSCRIPTION_ID) is required for --cloud azure",
                    )?;
                    let tenant_id = settings
                        .tenant_id
                        .context("--tenant-id (or AZURE_TENANT_ID) is required for --cloud azure")?;
                    let config = AzureServiceBusConfig {
                        tenant_id,
                        client_id: settings.client_id,
                        client_secret: settings.client_secret,
                        poll_interval: settings
                            .replication_poll_interval
                            .map(Duration::from_secs)
                            .unwrap_or(DEFAULT_POLL_INTERVAL),
                    };
                    let client = Arc::new(
                        AzureServiceBusClient::new(config).context("Failed to initialise Azure client")?,
                    );
                    let queues: Arc<dyn QueuesClient> = client.clone();
                    let waiter: Arc<dyn ReplicationWaiter> = client;
                    (queues, waiter, subscription_id)
                }
            };

        debug!(client = client.name(), subscription_id = %subscription_id, "Built engine");
        Ok(Engine::new(client, waiter, store, ProviderContext::new(subscription_id, timeouts)))
    }
}

fn file_settings(file: Option<&Path>) -> Result<Option<ProviderSettings>> {
    let Some(file) = file else {
        return Ok(None);
    };
    let declarations = load_declarations(file)
        .with_context(|| format!("Failed to load declarations from {}", file.display()))?;
    Ok(Some(declarations.provider))
}

fn finish(report: &Report) -> Result<()> {
    print!("{}", output::render_report(report));
    if !report.is_ok() {
        anyhow::bail!("{} resource(s) failed", report.errors.len());
    }
    Ok(())
}

// ── Plan / Apply ──────────────────────────────────────────────────────────────

pub async fn plan(target: &Target, declarations: PathBuf) -> Result<()> {
    converge(target, &declarations, true).await
}

pub async fn apply(target: &Target, declarations: PathBuf) -> Result<()> {
    converge(target, &declarations, false).await
}

async fn converge(target: &Target, path: &Path, dry_run: bool) -> Result<()> {
    let declarations = load_declarations(path)
        .with_context(|| format!("Failed to load declarations from {}", path.display()))?;
    debug!("Loaded {} declarations", declarations.resources.len());

    let engine = target.engine(Some(declarations.provider.clone()))?;
    let report = engine.apply(&declarations.resources, dry_run).await?;
    finish(&report)
}

// ── Refresh / Import / Destroy ────────────────────────────────────────────────

pub async fn refresh(target: &Target, file: Option<PathBuf>) -> Result<()> {
    let engine = target.engine(file_settings(file.as_deref())?)?;
    let report = engine.refresh().await?;
    finish(&report)
}

pub async fn import(target: &Target, address: String, id: String, file: Option<PathBuf>) -> Result<()> {
    let engine = target.engine(file_settings(file.as_deref())?)?;
    let data = engine
        .import(&address, &id)
        .await
        .with_context(|| format!("Failed to import {id}"))?;
    println!("Imported {} as {}.", id, data.address);
    Ok(())
}

pub async fn destroy(
    target: &Target,
    address: Option<String>,
    all: bool,
    file: Option<PathBuf>,
) -> Result<()> {
    let engine = target.engine(file_settings(file.as_deref())?)?;
    let address = if all { None } else { address };
    let report = engine.destroy(address.as_deref()).await?;
    finish(&report)
}

// ── Show / History ────────────────────────────────────────────────────────────

pub async fn show(target: &Target, address: Option<String>, show_secrets: bool, json: bool) -> Result<()> {
    let store = target.open_store()?;
    let resources = match address {
        Some(address) => vec![store
            .get_resource(&address)
            .await?
            .with_context(|| format!("No resource tracked at {address:?}"))?],
        None => store.list_resources().await?,
    };

    let resources: Vec<_> = if show_secrets {
        resources
    } else {
        resources.into_iter().map(output::masked).collect()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&resources)?);
    } else if resources.is_empty() {
        println!("No resources tracked.");
    } else {
        for data in &resources {
            print!("{}", output::render_resource(data));
        }
    }
    Ok(())
}

pub async fn history(target: &Target, address: Option<String>, limit: u32) -> Result<()> {
    let store = target.open_store()?;
    let events = store.list_events(address.as_deref(), limit).await?;
    for event in &events {
        println!("{}", output::render_event(event));
    }
    Ok(())
}
