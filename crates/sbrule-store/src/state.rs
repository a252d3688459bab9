use chrono::{DateTime, Utc};
use sbrule_domain::{DesiredConfiguration, ObservedState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything the engine remembers about one declared resource.
///
/// `id` is the persisted identity: `None` means the resource is absent
/// (never created, deleted, or found missing on refresh).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    /// Declaration key, unique within a state file.
    pub address: String,
    /// Canonical ARM id once the rule exists.
    pub id: Option<String>,
    /// Declared fields as last written by create/update or projected by read.
    pub config: DesiredConfiguration,
    /// Rights and secrets last read from the API.
    pub observed: Option<ObservedState>,
    /// Wall-clock time of the last successful read.
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl ResourceData {
    pub fn new(address: impl Into<String>, config: DesiredConfiguration) -> Self {
        Self {
            address: address.into(),
            id: None,
            config,
            observed: None,
            last_refreshed_at: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.id.is_some()
    }

    /// Forget the remote object: clears the id and everything read from it.
    pub fn mark_absent(&mut self) {
        self.id = None;
        self.observed = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LifecycleEvent {
    Created {
        id: Uuid,
        at: DateTime<Utc>,
        address: String,
        resource_id: String,
    },
    Updated {
        id: Uuid,
        at: DateTime<Utc>,
        address: String,
        resource_id: String,
    },
    Deleted {
        id: Uuid,
        at: DateTime<Utc>,
        address: String,
        resource_id: String,
    },
    Imported {
        id: Uuid,
        at: DateTime<Utc>,
        address: String,
        resource_id: String,
    },
    /// A refresh found the rule gone.
    Vanished {
        id: Uuid,
        at: DateTime<Utc>,
        address: String,
        resource_id: String,
    },
}

impl LifecycleEvent {
    pub fn address(&self) -> &str {
        match self {
            LifecycleEvent::Created { address, .. }
            | LifecycleEvent::Updated { address, .. }
            | LifecycleEvent::Deleted { address, .. }
            | LifecycleEvent::Imported { address, .. }
            | LifecycleEvent::Vanished { address, .. } => address,
        }
    }

    pub fn resource_id(&self) -> &str {
        match self {
            LifecycleEvent::Created { resource_id, .. }
            | LifecycleEvent::Updated { resource_id, .. }
            | LifecycleEvent::Deleted { resource_id, .. }
            | LifecycleEvent::Imported { resource_id, .. }
            | LifecycleEvent::Vanished { resource_id, .. } => resource_id,
        }
    }
}
