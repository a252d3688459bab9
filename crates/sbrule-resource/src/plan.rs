use sbrule_domain::DesiredConfiguration;
use sbrule_store::ResourceData;
use serde::Serialize;

/// The action needed to bring one resource in line with its declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Plan {
    Create,
    Update,
    /// Identifier fields changed; the rule is deleted and created again.
    Replace { fields: Vec<&'static str> },
    NoOp,
}

pub fn plan(prior: Option<&ResourceData>, desired: &DesiredConfiguration) -> Plan {
    let Some(prior) = prior.filter(|p| p.is_present()) else {
        return Plan::Create;
    };

    let fields = prior.config.identity_changes(desired);
    if !fields.is_empty() {
        return Plan::Replace { fields };
    }
    if prior.config.rights != desired.rights {
        return Plan::Update;
    }
    Plan::NoOp
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plan::Create => write!(f, "create"),
            Plan::Update => write!(f, "update in-place"),
            Plan::Replace { fields } => write!(f, "replace ({} forces replacement)", fields.join(", ")),
            Plan::NoOp => write!(f, "no changes"),
        }
    }
}
