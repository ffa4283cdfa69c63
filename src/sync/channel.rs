//! Channel policy
//!
//! Separates continuous transform updates from discrete property updates:
//! - Transform channel: position/rotation/scale, unordered and loss-tolerant.
//!   Every sample is absolute, so the next one supersedes a lost one.
//! - Property channel: everything else plus removals, ordered and reliable.
//!   Health changes, visibility toggles and removals never self-heal.
//!
//! There is no sequence number shared between the two channels.

use serde::{Deserialize, Serialize};

use crate::token::diff::{TokenDiff, TokenField};

/// Delivery channel for token updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Transform,
    Property,
}

/// Transport guarantees a channel requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub ordered: bool,
    pub reliable: bool,
}

impl Channel {
    pub fn delivery(&self) -> Delivery {
        match self {
            Channel::Transform => Delivery {
                ordered: false,
                reliable: false,
            },
            Channel::Property => Delivery {
                ordered: true,
                reliable: true,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Transform => "transform",
            Channel::Property => "property",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TokenField {
    /// Channel this field travels on
    pub fn channel(&self) -> Channel {
        match self {
            TokenField::Position | TokenField::Rotation | TokenField::Scale => Channel::Transform,
            _ => Channel::Property,
        }
    }

    pub fn is_transform(&self) -> bool {
        self.channel() == Channel::Transform
    }
}

/// A diff split by channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelPlan {
    /// Whether any transform field changed
    pub transform_changed: bool,
    /// The property-channel part of the diff
    pub property: TokenDiff,
}

impl ChannelPlan {
    pub fn is_empty(&self) -> bool {
        !self.transform_changed && self.property.is_empty()
    }
}

/// Classify every entry of a diff onto its channel
pub fn split_diff(diff: &TokenDiff) -> ChannelPlan {
    let transform_changed = diff.fields().any(|field| field.is_transform());
    let mut property = diff.clone();
    property.retain(|field| !field.is_transform());
    ChannelPlan {
        transform_changed,
        property,
    }
}
