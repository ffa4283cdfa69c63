//! Recipient registry
//!
//! Tracks every connected viewer replica, its visibility class, and the set
//! of token ids that replica currently knows about. A recipient only ever
//! receives transform samples and removals for ids in its known set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::sync::events::RecipientId;
use crate::token::state::NetworkId;
use crate::token::visibility::RecipientClass;

/// A connected viewer replica
pub struct Recipient {
    pub id: RecipientId,
    pub class: RecipientClass,
    known: RwLock<HashSet<NetworkId>>,
}

impl Recipient {
    pub fn new(id: RecipientId, class: RecipientClass) -> Self {
        Self {
            id,
            class,
            known: RwLock::new(HashSet::new()),
        }
    }

    pub fn is_gm(&self) -> bool {
        self.class.is_gm()
    }

    /// Whether this recipient has been sent the token
    pub fn knows(&self, network_id: &str) -> bool {
        self.known.read().contains(network_id)
    }

    /// Record that the token was sent; returns `false` if already known
    pub fn mark_known(&self, network_id: &NetworkId) -> bool {
        self.known.write().insert(network_id.clone())
    }

    /// Record that the token was withdrawn; returns `false` if it was not known
    pub fn forget(&self, network_id: &str) -> bool {
        self.known.write().remove(network_id)
    }

    /// Replace the known set, as after a full-state send
    pub fn reset_known(&self, ids: impl IntoIterator<Item = NetworkId>) {
        let mut known = self.known.write();
        known.clear();
        known.extend(ids);
    }

    /// Known ids, ordered
    pub fn known_ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.known.read().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn known_count(&self) -> usize {
        self.known.read().len()
    }
}

impl std::fmt::Debug for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipient")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("known", &self.known_count())
            .finish()
    }
}

/// Thread-safe registry of connected recipients
pub struct RecipientRegistry {
    recipients: DashMap<RecipientId, Arc<Recipient>>,
    next_id: AtomicU64,
}

impl RecipientRegistry {
    pub fn new() -> Self {
        Self {
            recipients: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh recipient id
    pub fn allocate_id(&self) -> RecipientId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a recipient, replacing any previous one with the same id
    pub fn join(&self, id: RecipientId, class: RecipientClass) -> Arc<Recipient> {
        let recipient = Arc::new(Recipient::new(id, class));
        if self.recipients.insert(id, recipient.clone()).is_some() {
            debug!(recipient = id, "Recipient rejoined, known set reset");
        }
        // Keep allocated ids ahead of explicitly chosen ones
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        info!(recipient = id, class = %class, "Recipient joined");
        recipient
    }

    pub fn leave(&self, id: RecipientId) -> Option<Arc<Recipient>> {
        let removed = self.recipients.remove(&id).map(|(_, r)| r);
        if let Some(recipient) = &removed {
            info!(
                recipient = id,
                known = recipient.known_count(),
                "Recipient left"
            );
        }
        removed
    }

    pub fn get(&self, id: RecipientId) -> Option<Arc<Recipient>> {
        self.recipients.get(&id).map(|r| r.clone())
    }

    /// All recipients, ordered by id
    pub fn iter(&self) -> Vec<Arc<Recipient>> {
        let mut all: Vec<Arc<Recipient>> = self.recipients.iter().map(|r| r.clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    pub fn ids(&self) -> Vec<RecipientId> {
        let mut ids: Vec<RecipientId> = self.recipients.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn count(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

impl Default for RecipientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_get() {
        let registry = RecipientRegistry::new();
        registry.join(1, RecipientClass::Gm);
        registry.join(2, RecipientClass::Player);

        assert_eq!(registry.count(), 2);
        assert!(registry.get(1).unwrap().is_gm());
        assert!(!registry.get(2).unwrap().is_gm());
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn test_leave() {
        let registry = RecipientRegistry::new();
        registry.join(1, RecipientClass::Player);
        assert!(registry.leave(1).is_some());
        assert!(registry.leave(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_iter_is_ordered() {
        let registry = RecipientRegistry::new();
        for id in [3, 1, 2] {
            registry.join(id, RecipientClass::Player);
        }
        let ids: Vec<RecipientId> = registry.iter().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(registry.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_allocate_skips_joined_ids() {
        let registry = RecipientRegistry::new();
        assert_eq!(registry.allocate_id(), 1);
        registry.join(10, RecipientClass::Gm);
        assert_eq!(registry.allocate_id(), 11);
    }

    #[test]
    fn test_known_set() {
        let recipient = Recipient::new(1, RecipientClass::Player);
        let id = NetworkId::from("goblin");
        assert!(recipient.mark_known(&id));
        assert!(!recipient.mark_known(&id));
        assert!(recipient.knows("goblin"));
        assert!(recipient.forget("goblin"));
        assert!(!recipient.forget("goblin"));

        recipient.reset_known(vec![NetworkId::from("b"), NetworkId::from("a")]);
        assert_eq!(
            recipient.known_ids(),
            vec![NetworkId::from("a"), NetworkId::from("b")]
        );
    }

    #[test]
    fn test_rejoin_resets_known() {
        let registry = RecipientRegistry::new();
        let first = registry.join(1, RecipientClass::Player);
        first.mark_known(&NetworkId::from("a"));
        let second = registry.join(1, RecipientClass::Player);
        assert_eq!(second.known_count(), 0);
        assert_eq!(registry.count(), 1);
    }
}
