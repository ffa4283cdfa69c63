//! Synchronization plumbing module
//!
//! Shared between host and client:
//! - Channel policy (which fields travel on which channel)
//! - Dirty field flags for host-side batching
//! - Typed inbound events and outbound messages

pub mod channel;
pub mod dirty;
pub mod events;

pub use channel::{split_diff, Channel, ChannelPlan, Delivery};
pub use dirty::DirtyFields;
pub use events::{OutboundMessage, RecipientId, SyncEvent};
