//! Networking module
//!
//! Transport between host and clients. Only the in-process loopback link is
//! provided; real transports feed `SyncEvent`s to a `ClientDriver` the same way.

pub mod loopback;

pub use loopback::{LinkStats, LoopbackLink, LoopbackRouter};
