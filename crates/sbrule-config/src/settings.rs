use serde::{Deserialize, Serialize};

/// Per-operation deadlines in seconds. Absent values fall back to the
/// resource defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSettings {
    pub create: Option<u64>,
    pub read: Option<u64>,
    pub update: Option<u64>,
    pub delete: Option<u64>,
}

/// Provider block of a declaration file. CLI flags and environment
/// variables take precedence over these values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    /// Seconds between disaster recovery replication polls.
    pub replication_poll_interval: Option<u64>,
}

impl ProviderSettings {
    /// Fill unset fields from `other`. Values already set win.
    pub fn merge(&mut self, other: ProviderSettings) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.subscription_id, other.subscription_id);
        fill(&mut self.tenant_id, other.tenant_id);
        fill(&mut self.client_id, other.client_id);
        fill(&mut self.client_secret, other.client_secret);
        fill(&mut self.timeouts.create, other.timeouts.create);
        fill(&mut self.timeouts.read, other.timeouts.read);
        fill(&mut self.timeouts.update, other.timeouts.update);
        fill(&mut self.timeouts.delete, other.timeouts.delete);
        fill(&mut self.replication_poll_interval, other.replication_poll_interval);
    }
}
