use std::time::Duration;

use sbrule_config::TimeoutSettings;

/// Deadlines applied to each lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    /// Overlay configured seconds on the defaults.
    pub fn from_settings(settings: &TimeoutSettings) -> Self {
        let defaults = Self::default();
        let pick = |secs: Option<u64>, fallback: Duration| {
            secs.map(Duration::from_secs).unwrap_or(fallback)
        };
        Self {
            create: pick(settings.create, defaults.create),
            read: pick(settings.read, defaults.read),
            update: pick(settings.update, defaults.update),
            delete: pick(settings.delete, defaults.delete),
        }
    }
}

/// What every handler needs besides the clients: the subscription new rules
/// are created in, and the operation deadlines.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub subscription_id: String,
    pub timeouts: Timeouts,
}

impl ProviderContext {
    pub fn new(subscription_id: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            timeouts,
        }
    }
}
