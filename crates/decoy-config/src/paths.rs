//! OS-specific directory resolution.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const APP_NAME: &str = "decoy";

/// Directories a decoy device reads and writes.
///
/// Each field resolves to the platform-appropriate location following OS
/// conventions (XDG on Linux, Known Folders on Windows, Library on macOS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    /// `config.ron` and `settings.ron`.
    pub config_dir: PathBuf,
    /// Game history log.
    pub data_dir: PathBuf,
    /// Log files.
    pub log_dir: PathBuf,
}

impl AppDirs {
    /// Resolve platform-specific directories without creating them on disk.
    pub fn resolve() -> Result<Self, ConfigError> {
        let config_base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        let app_config = config_base.join(APP_NAME);

        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| app_config.clone())
            .join(APP_NAME);

        Ok(Self {
            config_dir: app_config.clone(),
            data_dir,
            log_dir: app_config.join("logs"),
        })
    }

    /// Resolve directories rooted under a custom base path, e.g. from `--config`.
    pub fn with_root(root: &Path) -> Self {
        Self {
            config_dir: root.to_path_buf(),
            data_dir: root.join("data"),
            log_dir: root.join("logs"),
        }
    }

    /// Create all directories on disk.
    pub fn create_all(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let root = Path::new("/tmp/decoy-test");
        let dirs = AppDirs::with_root(root);
        assert_eq!(dirs.config_dir, root);
        assert!(dirs.data_dir.starts_with(root));
        assert!(dirs.log_dir.ends_with("logs"));
    }

    #[test]
    fn test_create_all() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = AppDirs::with_root(&tmp.path().join("nested"));
        dirs.create_all().unwrap();
        assert!(dirs.config_dir.is_dir());
        assert!(dirs.data_dir.is_dir());
        assert!(dirs.log_dir.is_dir());
    }
}
