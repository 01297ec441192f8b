//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for a decoy device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Player identity shown to the other devices.
    pub player: PlayerConfig,
    /// Game rules used by the host.
    pub game: GameConfig,
    /// Peer mesh settings.
    pub network: NetworkConfig,
    /// State replication settings.
    pub sync: SyncConfig,
    /// Content generation settings.
    pub generation: GenerationConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Local player identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Display name.
    pub name: String,
    /// Avatar image URL, empty for none.
    pub avatar_url: String,
}

/// Rules the host orchestrator runs the game with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Players admitted to a lobby before new joiners are refused.
    pub max_players: u32,
    /// Connected players required to start.
    pub min_players: u32,
    /// Number of prompting rounds.
    pub round_count: u32,
    /// Time players have to submit prompts.
    pub prompting_seconds: u32,
    /// Time players have to write fake prompts for one artifact.
    pub fooling_seconds: u32,
    /// Time players have to guess the real prompt.
    pub guessing_seconds: u32,
    /// How long round results are shown before advancing.
    pub scoring_seconds: u32,
    /// Extra prompting time granted while generations are still in flight.
    pub generation_grace_seconds: u32,
}

/// Peer mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the local listener binds to.
    pub listen_address: String,
    /// Port the local listener binds to (0 picks a free port).
    pub listen_port: u16,
    /// IP other devices should dial, written into the join ticket. Empty
    /// means loopback.
    pub advertise_address: String,
    /// Maximum concurrently open channels.
    pub max_channels: usize,
    /// Largest frame accepted or sent, in bytes.
    pub max_frame_bytes: u32,
    /// Frames at least this large are LZ4-compressed.
    pub compression_threshold: usize,
    /// Number of recent message ids remembered for deduplication.
    pub dedup_capacity: usize,
}

/// Replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between host diff/broadcast ticks in milliseconds.
    pub tick_interval_ms: u64,
}

/// Settings for the bundled content generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Simulated generation latency in milliseconds.
    pub latency_ms: u64,
    /// Generations still running after this long fail with a timeout.
    pub timeout_seconds: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to the log directory.
    pub file_logging: bool,
}

// --- Default implementations ---

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: "player".to_string(),
            avatar_url: String::new(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            min_players: 2,
            round_count: 2,
            prompting_seconds: 90,
            fooling_seconds: 60,
            guessing_seconds: 30,
            scoring_seconds: 10,
            generation_grace_seconds: 30,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 0,
            advertise_address: String::new(),
            max_channels: 64,
            max_frame_bytes: 16 * 1_048_576,
            compression_threshold: 1024,
            dedup_capacity: 4096,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 1500,
            timeout_seconds: 60,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }
}

impl GameConfig {
    /// Timer duration for the prompting stage in milliseconds.
    pub fn prompting_ms(&self) -> u64 {
        u64::from(self.prompting_seconds) * 1000
    }

    /// Timer duration for the fooling stage in milliseconds.
    pub fn fooling_ms(&self) -> u64 {
        u64::from(self.fooling_seconds) * 1000
    }

    /// Timer duration for the guessing stage in milliseconds.
    pub fn guessing_ms(&self) -> u64 {
        u64::from(self.guessing_seconds) * 1000
    }

    /// Timer duration for the scoring stage in milliseconds.
    pub fn scoring_ms(&self) -> u64 {
        u64::from(self.scoring_seconds) * 1000
    }

    /// Prompting extension while generations are pending, in milliseconds.
    pub fn generation_grace_ms(&self) -> u64 {
        u64::from(self.generation_grace_seconds) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("round_count: 2"));
        assert!(ron_str.contains("tick_interval_ms: 50"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(game: (round_count: 5), network: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.game.round_count, 5);
        assert_eq!(config.game.min_players, GameConfig::default().min_players);
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.player.name = "Alice".to_string();
        config.game.round_count = 3;
        config.network.listen_port = 9000;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_edited_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut modified = Config::default();
        modified.game.guessing_seconds = 45;
        modified.save(dir.path()).unwrap();

        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(loaded.game.guessing_seconds, 45);
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_stage_durations_in_millis() {
        let game = GameConfig {
            prompting_seconds: 2,
            scoring_seconds: 1,
            ..GameConfig::default()
        };
        assert_eq!(game.prompting_ms(), 2000);
        assert_eq!(game.scoring_ms(), 1000);
    }
}
