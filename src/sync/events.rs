//! Typed synchronization events
//!
//! `SyncEvent` is what a client's transport/session layer hands to the
//! reconciler. `OutboundMessage` is what the host broadcaster produces for a
//! single recipient.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::token::snapshot::TokenSnapshot;
use crate::token::state::{NetworkId, Transform};

use super::channel::Channel;

/// Identifier of a connected recipient
pub type RecipientId = u64;

/// Inbound synchronization event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Complete token set on initial connect
    FullStateReceived { tokens: Vec<TokenSnapshot> },
    /// Explicit resync of the scene against the current mirror
    Resync,
    /// Single-target transform sample
    TokenTransformReceived {
        network_id: NetworkId,
        transform: Transform,
    },
    /// Multi-target transform samples
    TransformBatchReceived {
        transforms: BTreeMap<NetworkId, Transform>,
    },
    /// Full property snapshot for one token
    TokenStateReceived {
        network_id: NetworkId,
        snapshot: TokenSnapshot,
    },
    /// Token left play
    TokenRemovedReceived { network_id: NetworkId },
}

impl SyncEvent {
    /// Channel this event travels on
    pub fn channel(&self) -> Channel {
        match self {
            SyncEvent::TokenTransformReceived { .. } | SyncEvent::TransformBatchReceived { .. } => {
                Channel::Transform
            }
            _ => Channel::Property,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::FullStateReceived { .. } => "full_state_received",
            SyncEvent::Resync => "resync",
            SyncEvent::TokenTransformReceived { .. } => "token_transform_received",
            SyncEvent::TransformBatchReceived { .. } => "transform_batch_received",
            SyncEvent::TokenStateReceived { .. } => "token_state_received",
            SyncEvent::TokenRemovedReceived { .. } => "token_removed_received",
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// An event addressed to one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub recipient: RecipientId,
    pub event: SyncEvent,
}

impl OutboundMessage {
    pub fn new(recipient: RecipientId, event: SyncEvent) -> Self {
        Self { recipient, event }
    }

    pub fn channel(&self) -> Channel {
        self.event.channel()
    }
}
