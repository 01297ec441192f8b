//! decoy sessions: the host and client roles wired over the peer mesh.

pub mod client;
pub mod error;
pub mod host;
pub mod input;
pub mod protocol;
pub mod view;

use std::net::{IpAddr, SocketAddr};

use decoy_config::{Config, NetworkConfig, SettingsStore};
use decoy_game::PlayerId;
use decoy_net::{CodecConfig, MeshConfig, PeerId};

pub use client::ClientSession;
pub use error::AppError;
pub use host::HostSession;
pub use protocol::AppMessage;

/// Mesh settings from the network section of the config.
pub fn mesh_config(network: &NetworkConfig) -> Result<MeshConfig, AppError> {
    let parse_ip = |text: &str| {
        text.parse::<IpAddr>()
            .map_err(|_| AppError::InvalidAddress(text.to_string()))
    };
    let ip = parse_ip(&network.listen_address)?;
    let advertise_ip = match network.advertise_address.trim() {
        "" => None,
        text => Some(parse_ip(text)?),
    };
    Ok(MeshConfig {
        bind_addr: SocketAddr::new(ip, network.listen_port),
        advertise_ip,
        max_channels: network.max_channels,
        codec: CodecConfig {
            max_frame_bytes: network.max_frame_bytes,
            compression_threshold: network.compression_threshold,
        },
        dedup_capacity: network.dedup_capacity,
    })
}

/// Settings key holding the remembered display name.
pub const NAME_KEY: &str = "player.name";

/// Settings key holding the remembered avatar URL.
pub const AVATAR_KEY: &str = "player.avatar_url";

/// Reconcile the player profile with the device settings store.
///
/// A name given on the command line is remembered for later sessions;
/// without one the remembered name replaces the configured default. A
/// configured avatar is remembered the same way.
pub fn remember_profile(
    config: &mut Config,
    name_from_cli: bool,
    store: &mut dyn SettingsStore,
) -> Result<(), AppError> {
    if name_from_cli {
        store.set(NAME_KEY, &config.player.name)?;
    } else if let Some(name) = store.get(NAME_KEY).filter(|name| !name.trim().is_empty()) {
        config.player.name = name;
    }

    if !config.player.avatar_url.is_empty() {
        store.set(AVATAR_KEY, &config.player.avatar_url)?;
    } else if let Some(url) = store.get(AVATAR_KEY) {
        config.player.avatar_url = url;
    }
    Ok(())
}

/// A player is identified by the peer id of their device.
pub fn player_id_of(peer: &PeerId) -> PlayerId {
    PlayerId::from(peer.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use decoy_config::FileSettingsStore;

    #[test]
    fn test_mesh_config_from_network_section() {
        let network = NetworkConfig {
            listen_port: 4100,
            advertise_address: "192.168.1.20".to_string(),
            ..NetworkConfig::default()
        };
        let mesh = mesh_config(&network).unwrap();
        assert_eq!(mesh.bind_addr, "0.0.0.0:4100".parse().unwrap());
        assert_eq!(mesh.advertise_ip, Some("192.168.1.20".parse().unwrap()));
        assert_eq!(mesh.dedup_capacity, network.dedup_capacity);
        assert_eq!(mesh.codec.max_frame_bytes, network.max_frame_bytes);
    }

    #[test]
    fn test_cli_name_is_remembered_for_next_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSettingsStore::open(dir.path()).unwrap();

        let mut first = Config::default();
        first.player.name = "Ada".to_string();
        first.player.avatar_url = "https://example.org/ada.png".to_string();
        remember_profile(&mut first, true, &mut store).unwrap();

        let mut store = FileSettingsStore::open(dir.path()).unwrap();
        let mut second = Config::default();
        remember_profile(&mut second, false, &mut store).unwrap();
        assert_eq!(second.player.name, "Ada");
        assert_eq!(second.player.avatar_url, "https://example.org/ada.png");
    }

    #[test]
    fn test_cli_name_replaces_remembered_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileSettingsStore::open(dir.path()).unwrap();
        store.set(NAME_KEY, "Ada").unwrap();

        let mut config = Config::default();
        config.player.name = "Grace".to_string();
        remember_profile(&mut config, true, &mut store).unwrap();

        assert_eq!(config.player.name, "Grace");
        assert_eq!(store.get(NAME_KEY).as_deref(), Some("Grace"));
    }

    #[test]
    fn test_bad_listen_address_rejected() {
        let network = NetworkConfig {
            listen_address: "not-an-ip".to_string(),
            ..NetworkConfig::default()
        };
        assert!(matches!(
            mesh_config(&network),
            Err(AppError::InvalidAddress(text)) if text == "not-an-ip"
        ));
    }
}
