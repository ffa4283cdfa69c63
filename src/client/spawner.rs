//! Visual spawning
//!
//! Constructing a visual may suspend while assets load, so spawns are
//! requested by the reconciler and completed later. `PendingSpawns` remembers
//! which ids have a construction in flight so that a second property event
//! for the same id coalesces instead of racing a duplicate spawn.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::token::state::{IdentityTriple, NetworkId, TokenState};

use super::visual::{MemoryVisual, TokenVisual};

/// Request to construct the visual for an unseen token
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub network_id: NetworkId,
    pub identity: IdentityTriple,
    /// Full state to place the visual with, instantly
    pub state: TokenState,
}

impl SpawnRequest {
    pub fn new(state: TokenState) -> Self {
        Self {
            network_id: state.network_id.clone(),
            identity: state.identity(),
            state,
        }
    }
}

/// Asynchronous visual constructor
pub trait Spawner: Send + Sync {
    type Visual: TokenVisual + 'static;

    /// Build the visual for `request.identity` and place it at `request.state`
    fn spawn(&self, request: SpawnRequest) -> BoxFuture<'static, Result<Self::Visual>>;
}

/// Ids with a visual construction in flight
#[derive(Debug, Default)]
pub struct PendingSpawns {
    pending: HashSet<NetworkId>,
    coalesced: HashMap<NetworkId, u32>,
}

impl PendingSpawns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an id as pending; returns `false` if it already was
    pub fn begin(&mut self, network_id: &NetworkId) -> bool {
        if self.pending.insert(network_id.clone()) {
            true
        } else {
            *self.coalesced.entry(network_id.clone()).or_insert(0) += 1;
            false
        }
    }

    /// Clear an id; returns how many requests were coalesced into its spawn
    pub fn complete(&mut self, network_id: &str) -> Option<u32> {
        if self.pending.remove(network_id) {
            Some(self.coalesced.remove(network_id).unwrap_or(0))
        } else {
            None
        }
    }

    pub fn is_pending(&self, network_id: &str) -> bool {
        self.pending.contains(network_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Spawner producing `MemoryVisual`s, optionally after a delay
#[derive(Debug, Clone, Default)]
pub struct MemorySpawner {
    delay: Option<Duration>,
    failing_packs: HashSet<String>,
}

impl MemorySpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate asset loading time
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every spawn whose pack matches
    pub fn failing_pack(mut self, pack_id: impl Into<String>) -> Self {
        self.failing_packs.insert(pack_id.into());
        self
    }
}

impl Spawner for MemorySpawner {
    type Visual = MemoryVisual;

    fn spawn(&self, request: SpawnRequest) -> BoxFuture<'static, Result<MemoryVisual>> {
        let delay = self.delay;
        let fails = self.failing_packs.contains(&request.identity.pack_id);
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fails {
                return Err(SyncError::SpawnFailed {
                    network_id: request.network_id.to_string(),
                    reason: format!("asset {} unavailable", request.identity),
                });
            }
            debug!(
                network_id = %request.network_id,
                identity = %request.identity,
                "Constructed memory visual"
            );
            Ok(MemoryVisual::new(&request.state))
        }
        .boxed()
    }
}
