//! In-process loopback transport
//!
//! Simulates the two delivery channels between host and clients without a
//! socket: property events arrive in order and never get lost, while
//! transform events may be dropped or swapped with the next transform. All
//! randomness comes from a seeded RNG so runs are reproducible.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::SimulationConfig;
use crate::error::{Result, SyncError};
use crate::sync::channel::Channel;
use crate::sync::events::{OutboundMessage, RecipientId, SyncEvent};

/// Delivery counters for one link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub delivered: u64,
    pub dropped: u64,
    pub reordered: u64,
}

/// One host-to-client link
pub struct LoopbackLink {
    rng: StdRng,
    drop_rate: f64,
    reorder_rate: f64,
    held: Option<SyncEvent>,
    stats: LinkStats,
}

impl LoopbackLink {
    pub fn new(drop_rate: f64, reorder_rate: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            drop_rate: drop_rate.clamp(0.0, 1.0),
            reorder_rate: reorder_rate.clamp(0.0, 1.0),
            held: None,
            stats: LinkStats::default(),
        }
    }

    /// A link that neither drops nor reorders
    pub fn perfect() -> Self {
        Self::new(0.0, 0.0, 0)
    }

    pub fn from_config(config: &SimulationConfig, recipient: RecipientId) -> Self {
        // Each link gets its own stream derived from the shared seed
        Self::new(
            config.transform_drop_rate,
            config.transform_reorder_rate,
            config.seed.wrapping_add(recipient),
        )
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Events that arrive at the client as a result of sending `event`
    pub fn deliver(&mut self, event: SyncEvent) -> Vec<SyncEvent> {
        let delivered = match event.channel() {
            Channel::Property => vec![event],
            Channel::Transform => self.deliver_transform(event),
        };
        self.stats.delivered += delivered.len() as u64;
        delivered
    }

    fn deliver_transform(&mut self, event: SyncEvent) -> Vec<SyncEvent> {
        if self.rng.gen_bool(self.drop_rate) {
            self.stats.dropped += 1;
            trace!(event = event.name(), "Loopback dropped transform");
            return Vec::new();
        }
        if let Some(held) = self.held.take() {
            return vec![event, held];
        }
        if self.rng.gen_bool(self.reorder_rate) {
            self.stats.reordered += 1;
            self.held = Some(event);
            return Vec::new();
        }
        vec![event]
    }

    /// Release a transform held back for reordering
    pub fn flush(&mut self) -> Option<SyncEvent> {
        let held = self.held.take();
        if held.is_some() {
            self.stats.delivered += 1;
        }
        held
    }
}

/// Routes outbound messages to per-recipient client queues
#[derive(Default)]
pub struct LoopbackRouter {
    routes: HashMap<RecipientId, (LoopbackLink, mpsc::Sender<SyncEvent>)>,
}

impl LoopbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, recipient: RecipientId, link: LoopbackLink, tx: mpsc::Sender<SyncEvent>) {
        self.routes.insert(recipient, (link, tx));
    }

    pub fn stats(&self, recipient: RecipientId) -> Option<LinkStats> {
        self.routes.get(&recipient).map(|(link, _)| link.stats())
    }

    /// Deliver one message through its recipient's link
    pub async fn route(&mut self, message: OutboundMessage) -> Result<()> {
        let Some((link, tx)) = self.routes.get_mut(&message.recipient) else {
            debug!(recipient = message.recipient, "No route for recipient");
            return Ok(());
        };
        for event in link.deliver(message.event) {
            tx.send(event)
                .await
                .map_err(|_| SyncError::ChannelClosed(format!("recipient {}", message.recipient)))?;
        }
        Ok(())
    }

    pub async fn route_all(&mut self, messages: Vec<OutboundMessage>) -> Result<()> {
        for message in messages {
            self.route(message).await?;
        }
        Ok(())
    }

    /// Release every held transform
    pub async fn flush(&mut self) -> Result<()> {
        for (recipient, (link, tx)) in self.routes.iter_mut() {
            if let Some(event) = link.flush() {
                tx.send(event)
                    .await
                    .map_err(|_| SyncError::ChannelClosed(format!("recipient {}", recipient)))?;
            }
        }
        Ok(())
    }
}
