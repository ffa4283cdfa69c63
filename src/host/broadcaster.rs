//! Host-side broadcaster
//!
//! Owns the authoritative mirror and turns changes to it into per-recipient
//! outbound messages. Property changes go out immediately on the property
//! channel as full snapshots. Transform-only changes mark the token dirty and
//! are flushed once per tick as one batch per recipient.
//!
//! Visibility is re-validated for every recipient on every change: a token a
//! recipient may no longer see is withdrawn with a removal, and a token that
//! becomes visible is introduced with a full snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::mirror::TokenMirror;
use crate::sync::channel::split_diff;
use crate::sync::dirty::DirtyFields;
use crate::sync::events::{OutboundMessage, RecipientId, SyncEvent};
use crate::token::diff::diff;
use crate::token::state::{NetworkId, TokenState, Transform};
use crate::token::visibility::RecipientClass;

use super::recipients::{Recipient, RecipientRegistry};

/// Authoritative sender of token state
pub struct Broadcaster {
    mirror: Arc<TokenMirror>,
    recipients: RecipientRegistry,
    dirty: Mutex<HashMap<NetworkId, DirtyFields>>,
}

impl Broadcaster {
    pub fn new(mirror: Arc<TokenMirror>) -> Self {
        Self {
            mirror,
            recipients: RecipientRegistry::new(),
            dirty: Mutex::new(HashMap::new()),
        }
    }

    pub fn mirror(&self) -> &Arc<TokenMirror> {
        &self.mirror
    }

    pub fn recipients(&self) -> &RecipientRegistry {
        &self.recipients
    }

    /// Register a recipient and build its initial full state
    pub fn join(&self, id: RecipientId, class: RecipientClass) -> OutboundMessage {
        let recipient = self.recipients.join(id, class);
        self.full_state(&recipient)
    }

    pub fn leave(&self, id: RecipientId) -> bool {
        self.recipients.leave(id).is_some()
    }

    /// Full-state payload for a recipient, resetting what it is known to hold
    pub fn full_state_for(&self, id: RecipientId) -> Option<OutboundMessage> {
        self.recipients
            .get(id)
            .map(|recipient| self.full_state(&recipient))
    }

    fn full_state(&self, recipient: &Recipient) -> OutboundMessage {
        let eligible: Vec<TokenState> = self
            .mirror
            .all()
            .into_iter()
            .filter(|state| state.is_visible_to(recipient.class))
            .collect();
        recipient.reset_known(eligible.iter().map(|state| state.network_id.clone()));
        debug!(
            recipient = recipient.id,
            tokens = eligible.len(),
            "Built full state"
        );
        OutboundMessage::new(
            recipient.id,
            SyncEvent::FullStateReceived {
                tokens: eligible.iter().map(TokenState::to_snapshot).collect(),
            },
        )
    }

    /// Put a token into play, or overwrite it. An empty id is replaced by a
    /// freshly generated one.
    pub fn place(&self, mut state: TokenState) -> (NetworkId, Vec<OutboundMessage>) {
        if state.network_id.is_empty() {
            state.network_id = NetworkId::generate();
        }
        let network_id = state.network_id.clone();
        let previous = self.mirror.upsert(state.clone());
        debug!(network_id = %network_id, replaced = previous.is_some(), "Token placed");
        // An overwrite may change fields outside the diff, so resend in full
        let messages = self.publish(None, &state);
        (network_id, messages)
    }

    /// Mutate a token in play
    pub fn update<F>(&self, network_id: &str, f: F) -> Vec<OutboundMessage>
    where
        F: FnOnce(&mut TokenState),
    {
        match self.mirror.update(network_id, f) {
            Some((before, after)) => self.publish(Some(&before), &after),
            None => {
                warn!(network_id = network_id, "Update for token not in play");
                Vec::new()
            }
        }
    }

    /// Move a token; only marks it dirty for the next transform flush
    pub fn move_token(&self, network_id: &str, transform: Transform) -> Vec<OutboundMessage> {
        self.update(network_id, |state| state.set_transform(transform))
    }

    /// Take a token out of play
    pub fn remove(&self, network_id: &str) -> Vec<OutboundMessage> {
        if self.mirror.remove(network_id).is_none() {
            debug!(network_id = network_id, "Removal for token not in play");
            return Vec::new();
        }
        self.dirty.lock().remove(network_id);

        let messages: Vec<OutboundMessage> = self
            .recipients
            .iter()
            .into_iter()
            .filter(|recipient| recipient.forget(network_id))
            .map(|recipient| {
                OutboundMessage::new(
                    recipient.id,
                    SyncEvent::TokenRemovedReceived {
                        network_id: NetworkId::from(network_id),
                    },
                )
            })
            .collect();
        debug!(
            network_id = network_id,
            recipients = messages.len(),
            "Token removed"
        );
        messages
    }

    fn publish(&self, previous: Option<&TokenState>, state: &TokenState) -> Vec<OutboundMessage> {
        let network_id = &state.network_id;
        let (flags, property_changed) = match previous {
            Some(previous) => {
                let changes = diff(previous, state);
                let plan = split_diff(&changes);
                (DirtyFields::from_diff(&changes), !plan.property.is_empty())
            }
            None => (DirtyFields::NONE, true),
        };

        if flags.needs_transform() {
            *self.dirty.lock().entry(network_id.clone()).or_default() |= flags;
        }
        if flags.visibility_changed() {
            debug!(network_id = %network_id, "Visibility changed, re-validating recipients");
        }

        let mut messages = Vec::new();
        for recipient in self.recipients.iter() {
            let eligible = state.is_visible_to(recipient.class);
            let known = recipient.knows(network_id);

            match (eligible, known) {
                (true, false) => {
                    recipient.mark_known(network_id);
                    trace!(recipient = recipient.id, network_id = %network_id, "Introducing token");
                    messages.push(Self::snapshot_message(recipient.id, state));
                }
                (true, true) if property_changed => {
                    messages.push(Self::snapshot_message(recipient.id, state));
                }
                (false, true) => {
                    recipient.forget(network_id);
                    debug!(recipient = recipient.id, network_id = %network_id, "Withdrawing token");
                    messages.push(OutboundMessage::new(
                        recipient.id,
                        SyncEvent::TokenRemovedReceived {
                            network_id: network_id.clone(),
                        },
                    ));
                }
                _ => {}
            }
        }
        messages
    }

    fn snapshot_message(recipient: RecipientId, state: &TokenState) -> OutboundMessage {
        OutboundMessage::new(
            recipient,
            SyncEvent::TokenStateReceived {
                network_id: state.network_id.clone(),
                snapshot: state.to_snapshot(),
            },
        )
    }

    /// Number of tokens awaiting a transform flush
    pub fn dirty_count(&self) -> usize {
        self.dirty.lock().len()
    }

    /// Drain dirty transforms into one batch per recipient, restricted to the
    /// ids each recipient knows
    pub fn flush_transforms(&self) -> Vec<OutboundMessage> {
        let dirty = std::mem::take(&mut *self.dirty.lock());
        if dirty.is_empty() {
            return Vec::new();
        }

        let transforms: BTreeMap<NetworkId, Transform> = dirty
            .into_iter()
            .filter(|(_, flags)| flags.needs_transform())
            .filter_map(|(id, _)| self.mirror.get(id.as_str()).map(|s| (id, s.transform())))
            .collect();

        let mut messages = Vec::new();
        for recipient in self.recipients.iter() {
            let batch: BTreeMap<NetworkId, Transform> = transforms
                .iter()
                .filter(|(id, _)| recipient.knows(id.as_str()))
                .map(|(id, transform)| (id.clone(), *transform))
                .collect();
            if batch.is_empty() {
                continue;
            }
            trace!(recipient = recipient.id, samples = batch.len(), "Transform batch");
            messages.push(OutboundMessage::new(
                recipient.id,
                SyncEvent::TransformBatchReceived { transforms: batch },
            ));
        }
        messages
    }

    /// Flush transform batches into `outbound` every `tick` until shutdown
    pub async fn run_transform_ticks(
        &self,
        tick: Duration,
        outbound: mpsc::Sender<OutboundMessage>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) {
        info!(tick_ms = tick.as_millis() as u64, "Transform flush loop started");

        let mut tick_interval = interval(tick);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    for message in self.flush_transforms() {
                        if outbound.send(message).await.is_err() {
                            info!("Outbound channel closed, stopping transform flush loop");
                            return;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Transform flush loop shutting down");
                    break;
                }
            }
        }
    }
}
