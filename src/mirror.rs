//! Token mirror module
//!
//! The mapping from `network_id` to `TokenState`. On the host it is the
//! authoritative store; on clients it is a replica mutated only by inbound
//! events. The backing map is never exposed: callers get clones and
//! get/upsert/remove/enumerate operations.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use crate::token::state::{NetworkId, TokenState};

/// Store of live token states keyed by network id
#[derive(Debug, Default)]
pub struct TokenMirror {
    tokens: RwLock<HashMap<NetworkId, TokenState>>,
}

impl TokenMirror {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::with_capacity(64)),
        }
    }

    /// Get a copy of a token's state
    pub fn get(&self, network_id: &str) -> Option<TokenState> {
        self.tokens.read().get(network_id).cloned()
    }

    pub fn contains(&self, network_id: &str) -> bool {
        self.tokens.read().contains_key(network_id)
    }

    /// Insert or overwrite a token, returning the previous state
    pub fn upsert(&self, state: TokenState) -> Option<TokenState> {
        trace!(network_id = %state.network_id, "Mirror upsert");
        self.tokens.write().insert(state.network_id.clone(), state)
    }

    /// Mutate a token in place, returning the state before and after
    pub fn update<F>(&self, network_id: &str, f: F) -> Option<(TokenState, TokenState)>
    where
        F: FnOnce(&mut TokenState),
    {
        let mut tokens = self.tokens.write();
        let state = tokens.get_mut(network_id)?;
        let before = state.clone();
        f(state);
        // The key is the network id; it must not change under us
        state.network_id = before.network_id.clone();
        Some((before, state.clone()))
    }

    /// Delete a token, returning its last state
    pub fn remove(&self, network_id: &str) -> Option<TokenState> {
        trace!(network_id = network_id, "Mirror remove");
        self.tokens.write().remove(network_id)
    }

    /// All token states, ordered by network id
    pub fn all(&self) -> Vec<TokenState> {
        let mut states: Vec<TokenState> = self.tokens.read().values().cloned().collect();
        states.sort_by(|a, b| a.network_id.cmp(&b.network_id));
        states
    }

    /// All network ids, ordered
    pub fn ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.tokens.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }

    pub fn clear(&self) {
        self.tokens.write().clear();
    }
}
