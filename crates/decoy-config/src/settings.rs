//! Key-value settings store for the remembered player profile, credentials
//! and other device-local values.
//!
//! Kept separate from [`Config`](crate::Config) so it is never shared or
//! printed along with the game settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// A string key-value store.
pub trait SettingsStore {
    /// Look up a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, replacing any previous one.
    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// [`SettingsStore`] persisted as `settings.ron`, rewritten on every `set`.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSettingsStore {
    /// Open the store in `config_dir`, starting empty if no file exists yet.
    pub fn open(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join("settings.ron");
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(ConfigError::ReadError)?;
            ron::from_str(&contents).map_err(ConfigError::ParseError)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::WriteError)?;
        }
        let serialized = ron::to_string(&self.values).map_err(ConfigError::SerializeError)?;
        std::fs::write(&self.path, serialized).map_err(ConfigError::WriteError)
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.to_string());
        self.persist()
    }
}
