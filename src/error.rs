//! Error handling module
//!
//! Defines the error taxonomy for token synchronization. Every error here is
//! drop-and-log: handlers never retry, the next full reconciliation pass
//! corrects whatever a dropped update left behind.

use thiserror::Error;

/// Main error type for token synchronization
#[derive(Error, Debug)]
pub enum SyncError {
    /// A property event arrived without a usable pack/asset identity
    #[error("Token {network_id} has no usable pack/asset identity")]
    MissingIdentity { network_id: String },

    /// The scene or loading controller was not available
    #[error("Collaborator unavailable: {0}")]
    MissingCollaborator(&'static str),

    /// A second visual was constructed for a token that already has one
    #[error("Duplicate spawn for token {network_id}")]
    DuplicateSpawn { network_id: String },

    /// A visual finished constructing after its token left the mirror
    #[error("Orphaned visual for token {network_id}")]
    OrphanedVisual { network_id: String },

    /// Visual construction failed
    #[error("Spawn failed for token {network_id}: {reason}")]
    SpawnFailed { network_id: String, reason: String },

    /// Visual construction exceeded the configured timeout
    #[error("Spawn timed out for token {network_id}")]
    SpawnTimeout { network_id: String },

    /// Snapshot could not be encoded or decoded
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// An event or message channel closed unexpectedly
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl SyncError {
    /// Whether this error is an expected, silent drop
    ///
    /// Silent drops are logged at trace level, everything else at warn.
    pub fn is_silent(&self) -> bool {
        matches!(self, SyncError::MissingCollaborator(_))
    }

    /// The token this error concerns, if any
    pub fn network_id(&self) -> Option<&str> {
        match self {
            SyncError::MissingIdentity { network_id }
            | SyncError::DuplicateSpawn { network_id }
            | SyncError::OrphanedVisual { network_id }
            | SyncError::SpawnFailed { network_id, .. }
            | SyncError::SpawnTimeout { network_id } => Some(network_id),
            _ => None,
        }
    }
}

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;
