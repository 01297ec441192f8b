//! Configuration system for decoy.
//!
//! Provides runtime-configurable settings that persist to disk as RON files,
//! CLI overrides via clap, platform directory resolution, and a small
//! key-value store for credentials.

mod cli;
mod config;
mod error;
mod paths;
mod settings;

pub use cli::{CliArgs, Command};
pub use config::{
    Config, DebugConfig, GameConfig, GenerationConfig, NetworkConfig, PlayerConfig, SyncConfig,
};
pub use error::ConfigError;
pub use paths::AppDirs;
pub use settings::{FileSettingsStore, SettingsStore};
