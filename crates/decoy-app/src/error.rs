//! Errors that end a session.

use decoy_config::ConfigError;
use decoy_net::{MeshError, TicketError};
use decoy_sync::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Mesh(#[from] MeshError),

    #[error("replication error: {0}")]
    Sync(#[from] SyncError),

    #[error("bad ticket: {0}")]
    Ticket(#[from] TicketError),

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
