use std::path::{Path, PathBuf};

use sbrule_domain::{AccessRights, DesiredConfiguration};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawFile, RawRule};
use crate::settings::ProviderSettings;

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub address: String,
    pub config: DesiredConfiguration,
}

/// Everything read from a declaration file or directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub provider: ProviderSettings,
    /// Sorted by address.
    pub resources: Vec<Declaration>,
}

impl Declarations {
    pub fn get(&self, address: &str) -> Option<&Declaration> {
        self.resources.iter().find(|d| d.address == address)
    }
}

/// Load declarations from `path`.
///
/// `path` may be a single YAML file or a directory; for a directory every
/// `*.yml` / `*.yaml` file directly inside it is read in name order:
///
/// ```text
/// <dir>/
///   provider.yml     <- provider: { subscription_id: ... }
///   orders.yml       <- resources: { orders_listen: { ... } }
/// ```
///
/// Provider blocks are merged (first value wins). An address declared twice
/// is an error. Every declaration is validated before it is returned.
pub fn load_declarations(path: &Path) -> Result<Declarations, ConfigError> {
    let files = if path.is_dir() {
        yaml_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut out = Declarations::default();
    for file in &files {
        load_file(file, &mut out)?;
    }
    out.resources.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(out)
}

fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yml" || e == "yaml");
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_file(path: &Path, out: &mut Declarations) -> Result<(), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loading declarations from {}", path.display());

    if let Some(provider) = raw.provider {
        out.provider.merge(provider);
    }

    for (address, rule) in raw.resources {
        check_address(&address, path)?;
        if out.get(&address).is_some() {
            return Err(ConfigError::Conversion {
                path: path.display().to_string(),
                message: format!("resource '{}' is declared more than once", address),
            });
        }
        let config = convert_rule(rule);
        config.validate().map_err(|source| ConfigError::Invalid {
            path: path.display().to_string(),
            address: address.clone(),
            source,
        })?;
        out.resources.push(Declaration { address, config });
    }
    Ok(())
}

fn check_address(address: &str, path: &Path) -> Result<(), ConfigError> {
    let valid = !address.is_empty()
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!(
                "invalid resource address '{}': use letters, digits, '_' and '-'",
                address
            ),
        });
    }
    Ok(())
}

fn convert_rule(raw: RawRule) -> DesiredConfiguration {
    DesiredConfiguration {
        name: raw.name,
        namespace_name: raw.namespace_name,
        queue_name: raw.queue_name,
        resource_group_name: raw.resource_group_name,
        rights: AccessRights::new(raw.listen, raw.send, raw.manage),
    }
}
