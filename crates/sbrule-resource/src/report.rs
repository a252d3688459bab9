use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Change {
    Created { address: String, id: String },
    Updated { address: String, id: String },
    Replaced { address: String, id: String, fields: Vec<String> },
    Deleted { address: String, id: String },
    Imported { address: String, id: String },
    Refreshed { address: String, id: String },
    /// The rule was gone when refreshed; its id has been cleared.
    Vanished { address: String, id: String },
}

impl Change {
    pub fn address(&self) -> &str {
        match self {
            Change::Created { address, .. }
            | Change::Updated { address, .. }
            | Change::Replaced { address, .. }
            | Change::Deleted { address, .. }
            | Change::Imported { address, .. }
            | Change::Refreshed { address, .. }
            | Change::Vanished { address, .. } => address,
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Created { address, id } => write!(f, "+ {address}: create {id}"),
            Change::Updated { address, id } => write!(f, "~ {address}: update {id}"),
            Change::Replaced { address, id, fields } => {
                write!(f, "-/+ {address}: replace {id} ({} changed)", fields.join(", "))
            }
            Change::Deleted { address, id } => write!(f, "- {address}: delete {id}"),
            Change::Imported { address, id } => write!(f, "<= {address}: import {id}"),
            Change::Refreshed { address, id } => write!(f, "  {address}: refreshed {id}"),
            Change::Vanished { address, id } => write!(f, "! {address}: {id} no longer exists"),
        }
    }
}

/// Outcome of an engine run. Per-resource failures are collected in
/// `errors` so one bad rule does not stop the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub dry_run: bool,
    pub changes: Vec<Change>,
    pub errors: Vec<String>,
}

impl Report {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            changes: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
