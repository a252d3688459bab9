use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::settings::ProviderSettings;

/// Raw YAML representation of a declaration file.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawFile {
    pub provider: Option<ProviderSettings>,
    /// Resource declarations keyed by address.
    #[serde(default)]
    pub resources: BTreeMap<String, RawRule>,
}

/// Raw YAML representation of one queue authorization rule.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawRule {
    pub name: String,
    pub namespace_name: String,
    pub queue_name: String,
    pub resource_group_name: String,
    #[serde(default)]
    pub listen: bool,
    #[serde(default)]
    pub send: bool,
    #[serde(default)]
    pub manage: bool,
}
