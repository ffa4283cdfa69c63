//! Token module
//!
//! The canonical per-token state and its contracts:
//! - `state` - TokenState and its value types
//! - `snapshot` - lossless conversion to a transmission-safe flat form
//! - `diff` - allow-listed field diffs
//! - `visibility` - per-recipient sync predicate

pub mod diff;
pub mod snapshot;
pub mod state;
pub mod visibility;

pub use diff::{diff, FieldValue, TokenDiff, TokenField, DIFF_FIELDS};
pub use snapshot::TokenSnapshot;
pub use state::{IdentityTriple, NetworkId, TokenState, Transform, Vec3};
pub use visibility::RecipientClass;
