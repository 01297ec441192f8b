//! Replication errors.

/// Errors raised while converting between typed state and its JSON tree.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The host state could not be turned into a JSON value.
    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),

    /// A mirrored value did not decode into the typed state.
    #[error("failed to decode state at version {version}: {source}")]
    Decode {
        /// Version of the value that failed to decode.
        version: u64,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },
}
