//! Host module
//!
//! The authoritative side of the session:
//! - `recipients` - connected viewer replicas and what each one knows
//! - `broadcaster` - visibility filtering, channel choice and transform batching

pub mod broadcaster;
pub mod recipients;

pub use broadcaster::Broadcaster;
pub use recipients::{Recipient, RecipientRegistry};
