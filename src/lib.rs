//! Tablesync Library
//!
//! Token state synchronization for a networked tabletop session. One
//! authoritative host owns every token; each viewer replica (player or GM)
//! mirrors the tokens it may see and keeps a rendered scene consistent with
//! them.
//!
//! ## Modules
//!
//! - `client` - Event reconciliation, asynchronous visual spawning and the client driver
//! - `config` - Session configuration management
//! - `error` - Error types and result definitions
//! - `host` - Recipient registry and the authoritative broadcaster
//! - `mirror` - Network id to token state store
//! - `net` - Loopback transport used by the simulator and tests
//! - `sync` - Channels, dirty flags and synchronization events
//! - `token` - Token state, snapshots, diffs and visibility

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod mirror;
pub mod net;
pub mod sync;
pub mod token;

// Re-export commonly used types
pub use client::{ClientDriver, Reconciler};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use host::Broadcaster;
pub use mirror::TokenMirror;
pub use sync::SyncEvent;
pub use token::{NetworkId, TokenState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
