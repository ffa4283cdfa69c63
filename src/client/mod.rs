//! Client module
//!
//! Everything a viewer replica (player or GM) needs to turn inbound events
//! into a locally rendered scene:
//! - `visual` - visual collaborator trait, registry and loading gate
//! - `spawner` - asynchronous visual construction and the pending set
//! - `reconciler` - event application and full-state reconciliation
//! - `driver` - the single-threaded event loop around the reconciler

pub mod driver;
pub mod reconciler;
pub mod spawner;
pub mod visual;

pub use driver::ClientDriver;
pub use reconciler::{ReconcileStats, Reconciler, SpawnOutcome};
pub use spawner::{MemorySpawner, PendingSpawns, SpawnRequest, Spawner};
pub use visual::{LoadingFlag, LoadingGate, MemoryVisual, Scene, TokenVisual, VisualRegistry};
