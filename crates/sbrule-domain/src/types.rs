use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DomainError;
use crate::validate;

const SERVICE_BUS_PROVIDER: &str = "Microsoft.ServiceBus";

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Address of a Service Bus namespace. Scope of the disaster recovery
/// replication wait.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub namespace_name: String,
}

impl NamespaceId {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        namespace_name: impl Into<String>,
    ) -> Self {
        NamespaceId {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            namespace_name: namespace_name.into(),
        }
    }

    /// Canonical ARM id of the namespace.
    pub fn id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/namespaces/{}",
            self.subscription_id, self.resource_group, SERVICE_BUS_PROVIDER, self.namespace_name,
        )
    }
}

impl std::fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Namespace {:?} / Resource Group {:?}",
            self.namespace_name, self.resource_group
        )
    }
}

/// Composite key of a queue authorization rule.
///
/// The canonical string form (see [`QueueAuthorizationRuleId::id`]) is the
/// persisted identity of the resource and is re-parsed on every read and
/// delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueAuthorizationRuleId {
    pub subscription_id: String,
    pub resource_group: String,
    pub namespace_name: String,
    pub queue_name: String,
    pub authorization_rule_name: String,
}

impl QueueAuthorizationRuleId {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        namespace_name: impl Into<String>,
        queue_name: impl Into<String>,
        authorization_rule_name: impl Into<String>,
    ) -> Self {
        QueueAuthorizationRuleId {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            namespace_name: namespace_name.into(),
            queue_name: queue_name.into(),
            authorization_rule_name: authorization_rule_name.into(),
        }
    }

    pub fn id(&self) -> String {
        format!(
            "{}/queues/{}/authorizationRules/{}",
            self.namespace_id().id(),
            self.queue_name,
            self.authorization_rule_name,
        )
    }

    pub fn namespace_id(&self) -> NamespaceId {
        NamespaceId::new(
            self.subscription_id.clone(),
            self.resource_group.clone(),
            self.namespace_name.clone(),
        )
    }

    /// Parse a canonical id string.
    ///
    /// Segment keys are matched case-sensitively. Missing, empty or extra
    /// segments are rejected.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let invalid = |reason: String| DomainError::InvalidResourceId {
            id: input.to_string(),
            reason,
        };

        let rest = input
            .strip_prefix('/')
            .ok_or_else(|| invalid("expected a leading '/'".into()))?;
        let segments: Vec<&str> = rest.split('/').collect();

        const KEYS: [&str; 6] = [
            "subscriptions",
            "resourceGroups",
            "providers",
            "namespaces",
            "queues",
            "authorizationRules",
        ];
        if segments.len() != KEYS.len() * 2 {
            return Err(invalid(format!(
                "expected {} segments, got {}",
                KEYS.len() * 2,
                segments.len()
            )));
        }

        let mut values = Vec::with_capacity(KEYS.len());
        for (pair, expected) in segments.chunks(2).zip(KEYS) {
            let (key, value) = (pair[0], pair[1]);
            if key != expected {
                return Err(invalid(format!("expected segment {expected:?}, got {key:?}")));
            }
            if value.is_empty() {
                return Err(invalid(format!("segment {expected:?} has an empty value")));
            }
            values.push(value);
        }

        if values[2] != SERVICE_BUS_PROVIDER {
            return Err(invalid(format!(
                "expected provider {SERVICE_BUS_PROVIDER:?}, got {:?}",
                values[2]
            )));
        }

        Ok(QueueAuthorizationRuleId::new(
            values[0], values[1], values[3], values[4], values[5],
        ))
    }
}

impl FromStr for QueueAuthorizationRuleId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for QueueAuthorizationRuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Queue Authorization Rule {}", self.id())
    }
}

// ── Access rights ─────────────────────────────────────────────────────────────

/// Wire value of a single right, as ARM spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessRight {
    Listen,
    Send,
    Manage,
}

impl std::fmt::Display for AccessRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessRight::Listen => write!(f, "Listen"),
            AccessRight::Send => write!(f, "Send"),
            AccessRight::Manage => write!(f, "Manage"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRights {
    #[serde(default)]
    pub listen: bool,
    #[serde(default)]
    pub send: bool,
    #[serde(default)]
    pub manage: bool,
}

impl AccessRights {
    pub fn new(listen: bool, send: bool, manage: bool) -> Self {
        AccessRights { listen, send, manage }
    }

    pub fn is_empty(&self) -> bool {
        !(self.listen || self.send || self.manage)
    }

    /// At least one right must be set, and `manage` needs `listen` and `send`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.is_empty() {
            return Err(DomainError::InvalidRights(
                "one of the `listen`, `send` or `manage` properties needs to be set".into(),
            ));
        }
        if self.manage && !(self.listen && self.send) {
            return Err(DomainError::InvalidRights(
                "if `manage` is set both `listen` and `send` must be set to true too".into(),
            ));
        }
        Ok(())
    }

    /// Rights in the order the API expects them: Listen, Send, Manage.
    pub fn expand(&self) -> Vec<AccessRight> {
        let mut out = Vec::with_capacity(3);
        if self.listen {
            out.push(AccessRight::Listen);
        }
        if self.send {
            out.push(AccessRight::Send);
        }
        if self.manage {
            out.push(AccessRight::Manage);
        }
        out
    }

    pub fn flatten(rights: &[AccessRight]) -> Self {
        AccessRights {
            listen: rights.contains(&AccessRight::Listen),
            send: rights.contains(&AccessRight::Send),
            manage: rights.contains(&AccessRight::Manage),
        }
    }
}

// ── Configuration and state ───────────────────────────────────────────────────

/// User-declared fields of a queue authorization rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredConfiguration {
    pub name: String,
    pub namespace_name: String,
    pub queue_name: String,
    pub resource_group_name: String,
    #[serde(flatten)]
    pub rights: AccessRights,
}

impl DesiredConfiguration {
    /// Run every field validator and the rights rules.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate::authorization_rule_name(&self.name)?;
        validate::namespace_name(&self.namespace_name)?;
        validate::queue_name(&self.queue_name)?;
        validate::resource_group_name(&self.resource_group_name)?;
        self.rights.validate()
    }

    pub fn rule_id(&self, subscription_id: &str) -> QueueAuthorizationRuleId {
        QueueAuthorizationRuleId::new(
            subscription_id,
            self.resource_group_name.clone(),
            self.namespace_name.clone(),
            self.queue_name.clone(),
            self.name.clone(),
        )
    }

    /// Names of the identifier fields that differ from `other`.
    /// A change to any of them forces replacement.
    pub fn identity_changes(&self, other: &DesiredConfiguration) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.name != other.name {
            changed.push("name");
        }
        if self.namespace_name != other.namespace_name {
            changed.push("namespace_name");
        }
        if self.queue_name != other.queue_name {
            changed.push("queue_name");
        }
        if self.resource_group_name != other.resource_group_name {
            changed.push("resource_group_name");
        }
        changed
    }
}

/// Attributes read back from the API after create, update or refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub rights: AccessRights,
    pub primary_key: String,
    pub secondary_key: String,
    pub primary_connection_string: String,
    pub secondary_connection_string: String,
    pub primary_connection_string_alias: String,
    pub secondary_connection_string_alias: String,
}

impl ObservedState {
    /// The (name, value) pairs of the six secret attributes.
    pub fn secrets(&self) -> [(&'static str, &str); 6] {
        [
            ("primary_key", self.primary_key.as_str()),
            ("secondary_key", self.secondary_key.as_str()),
            ("primary_connection_string", self.primary_connection_string.as_str()),
            ("secondary_connection_string", self.secondary_connection_string.as_str()),
            ("primary_connection_string_alias", self.primary_connection_string_alias.as_str()),
            ("secondary_connection_string_alias", self.secondary_connection_string_alias.as_str()),
        ]
    }
}
