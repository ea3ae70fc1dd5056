//! Registry settings, read from `$TENANCY_CONFIG` or an explicit YAML file
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tenancy_registry::{core::Resource, StoreBuilder};
use thiserror::Error;

const TENANCY_CONFIG: &str = "TENANCY_CONFIG";

/// Possible errors when loading registry settings
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read '{1:?}': {0}")]
    ReadConfig(#[source] std::io::Error, PathBuf),

    /// Failed to parse the config YAML
    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_yaml::Error),

    /// A setting is out of range
    #[error("invalid setting {setting}: {message}")]
    Invalid {
        /// The offending setting, as named in YAML
        setting: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Settings shared by the storage of every kind
///
/// ```yaml
/// privilegedUsername: admin
/// watchCapacity: 1024
/// historyWindow: 1000
/// maxPageSize: 500
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// The user that is never confined to a tenant
    pub privileged_username: String,
    /// How many changes a live watch may fall behind before it is terminated
    pub watch_capacity: usize,
    /// How many past changes are kept for watches resuming from a resource version
    pub history_window: usize,
    /// Upper bound on the page size of a limited list
    pub max_page_size: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            privileged_username: "admin".into(),
            watch_capacity: 1024,
            history_window: 1000,
            max_page_size: 500,
        }
    }
}

impl RegistryConfig {
    /// Read settings from an arbitrary location
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(&path)
            .map_err(|source| ConfigError::ReadConfig(source, path.as_ref().into()))?;
        Self::from_yaml(&data)
    }

    /// Read settings from a YAML string
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(ConfigError::Parse)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read settings from the file named by `TENANCY_CONFIG`, if it is set
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match std::env::var_os(TENANCY_CONFIG) {
            Some(path) if !path.is_empty() => Self::read_from(PathBuf::from(path)).map(Some),
            _ => Ok(None),
        }
    }

    /// Settings from `TENANCY_CONFIG`, falling back to the defaults
    pub fn infer() -> Result<Self, ConfigError> {
        match Self::from_env()? {
            Some(config) => Ok(config),
            None => {
                tracing::debug!("{TENANCY_CONFIG} not set, using default registry settings");
                Ok(Self::default())
            }
        }
    }

    /// Check every setting is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |setting, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    setting,
                    message: "must be positive".into(),
                })
            } else {
                Ok(())
            }
        };
        positive("watchCapacity", self.watch_capacity as u64)?;
        positive("historyWindow", self.history_window as u64)?;
        positive("maxPageSize", self.max_page_size.into())
    }

    /// A store builder for `K` carrying these settings
    pub fn store_builder<K: Resource + 'static>(&self) -> StoreBuilder<K> {
        StoreBuilder::new()
            .watch_capacity(self.watch_capacity)
            .history_window(self.history_window)
            .max_page_size(self.max_page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_camel_case_yaml() {
        let config = RegistryConfig::from_yaml("privilegedUsername: root\nmaxPageSize: 50\n").unwrap();
        assert_eq!(config.privileged_username, "root");
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.watch_capacity, RegistryConfig::default().watch_capacity);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(RegistryConfig::from_yaml("").unwrap(), RegistryConfig::default());
    }

    #[test]
    fn rejects_unknown_and_zero_settings() {
        assert!(matches!(
            RegistryConfig::from_yaml("bogus: 1"),
            Err(ConfigError::Parse(_))
        ));
        let err = RegistryConfig::from_yaml("historyWindow: 0").unwrap_err();
        assert_eq!(err.to_string(), "invalid setting historyWindow: must be positive");
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"privilegedUsername: ops\nwatchCapacity: 8\n").unwrap();
        let config = RegistryConfig::read_from(file.path()).unwrap();
        assert_eq!(config.privileged_username, "ops");
        assert_eq!(config.watch_capacity, 8);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            RegistryConfig::read_from(&missing),
            Err(ConfigError::ReadConfig(_, p)) if p == missing
        ));
    }
}
