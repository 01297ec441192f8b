//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::Config;

/// decoy command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "decoy", about = "Serverless prompt-guessing party game")]
pub struct CliArgs {
    /// What this device should do.
    #[command(subcommand)]
    pub command: Command,

    /// Display name.
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Listener port.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Number of rounds (host only).
    #[arg(long, global = true)]
    pub rounds: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Device role.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Host a game and print the ticket other players join with.
    Host,
    /// Join the game behind a host ticket (`<peer-id>@<host>:<port>`).
    Join {
        /// Ticket printed by the host.
        ticket: String,
    },
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref name) = args.name {
            self.player.name = name.clone();
        }
        if let Some(port) = args.port {
            self.network.listen_port = port;
        }
        if let Some(rounds) = args.rounds {
            self.game.round_count = rounds;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from(["decoy", "host", "--name", "Ada", "--rounds", "4"]);
        config.apply_cli_overrides(&args);
        assert_eq!(args.command, Command::Host);
        assert_eq!(config.player.name, "Ada");
        assert_eq!(config.game.round_count, 4);
        // Non-overridden fields retain defaults
        assert_eq!(config.network.listen_port, 0);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        let args = CliArgs::parse_from(["decoy", "join", "abc@127.0.0.1:7000"]);
        config.apply_cli_overrides(&args);
        assert_eq!(config, original);
        assert_eq!(
            args.command,
            Command::Join {
                ticket: "abc@127.0.0.1:7000".to_string()
            }
        );
    }
}
