//! Client-side reconciler
//!
//! Applies inbound events to the mirror and to the scene's visuals. Per
//! network id the scene is either unspawned or spawned:
//! - transform event: known id retargets the visual's interpolation, unknown
//!   or still-spawning id is dropped; the mirror is not touched
//! - property event: mirror overwritten, then the visual is updated in place
//!   or a spawn is requested
//! - removal event: mirror entry deleted, visual torn down if present
//!
//! While the scene is loading, property events only reach the mirror; the
//! full pass run after loading brings the visuals up to date in one step.
//! The reconciler trusts what arrives and does not re-check visibility.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{Result, SyncError};
use crate::mirror::TokenMirror;
use crate::sync::events::SyncEvent;
use crate::token::snapshot::TokenSnapshot;
use crate::token::state::{NetworkId, TokenState, Transform};

use super::spawner::{PendingSpawns, SpawnRequest};
use super::visual::{Scene, TokenVisual};

/// What happened to a visual whose construction finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// Registered in the scene with the latest mirror state
    Registered,
    /// Token was removed while the spawn was in flight; visual torn down
    DiscardedOrphan,
    /// Scene already had a visual for the id; new visual torn down
    DiscardedDuplicate,
}

/// Running counters, mostly for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub transforms_applied: u64,
    pub transforms_dropped: u64,
    pub states_applied: u64,
    pub states_deferred: u64,
    pub spawns_requested: u64,
    pub spawns_coalesced: u64,
    pub removals: u64,
    pub full_passes: u64,
}

/// Applies inbound events to a mirror and a scene
#[derive(Debug)]
pub struct Reconciler {
    mirror: Arc<TokenMirror>,
    pending: PendingSpawns,
    resync_deferred: bool,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new(mirror: Arc<TokenMirror>) -> Self {
        Self {
            mirror,
            pending: PendingSpawns::new(),
            resync_deferred: false,
            stats: ReconcileStats::default(),
        }
    }

    pub fn mirror(&self) -> &Arc<TokenMirror> {
        &self.mirror
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    pub fn is_spawn_pending(&self, network_id: &str) -> bool {
        self.pending.is_pending(network_id)
    }

    pub fn pending_spawns(&self) -> usize {
        self.pending.len()
    }

    /// Whether a full pass was requested while the scene was loading
    pub fn resync_deferred(&self) -> bool {
        self.resync_deferred
    }

    /// Process one inbound event to completion
    ///
    /// Returns the spawns the caller must start. `scene` is `None` when the
    /// play controller is not available; visual work is then dropped.
    pub fn handle<V: TokenVisual>(
        &mut self,
        event: SyncEvent,
        scene: Option<&mut Scene<V>>,
    ) -> Result<Vec<SpawnRequest>> {
        trace!(event = event.name(), "Reconciling event");
        match event {
            SyncEvent::FullStateReceived { tokens } => {
                self.load_full_state(tokens);
                self.reconcile_all(scene)
            }
            SyncEvent::Resync => self.reconcile_all(scene),
            SyncEvent::TokenTransformReceived {
                network_id,
                transform,
            } => {
                self.apply_transform(&network_id, transform, scene)?;
                Ok(Vec::new())
            }
            SyncEvent::TransformBatchReceived { transforms } => {
                let scene = scene.ok_or(SyncError::MissingCollaborator("scene"))?;
                for (network_id, transform) in transforms {
                    self.apply_transform(&network_id, transform, Some(&mut *scene))?;
                }
                Ok(Vec::new())
            }
            SyncEvent::TokenStateReceived {
                network_id,
                snapshot,
            } => Ok(self
                .apply_state(network_id, snapshot, scene)?
                .into_iter()
                .collect()),
            SyncEvent::TokenRemovedReceived { network_id } => {
                self.apply_removal(&network_id, scene)?;
                Ok(Vec::new())
            }
        }
    }

    /// Replace the mirror with the full state; visuals are left to the full pass
    fn load_full_state(&mut self, tokens: Vec<TokenSnapshot>) {
        let count = tokens.len();
        self.mirror.clear();
        for snapshot in tokens {
            if snapshot.network_id.is_empty() {
                warn!("Full state entry without network id dropped");
                continue;
            }
            self.mirror.upsert(TokenState::from_snapshot(snapshot));
        }
        debug!(tokens = count, "Full state loaded into mirror");
    }

    /// Retarget a spawned visual; unknown ids are dropped
    pub fn apply_transform<V: TokenVisual>(
        &mut self,
        network_id: &str,
        transform: Transform,
        scene: Option<&mut Scene<V>>,
    ) -> Result<()> {
        let scene = scene.ok_or(SyncError::MissingCollaborator("scene"))?;
        match scene.visuals.get_mut(network_id) {
            Some(visual) => {
                visual.set_interpolation_target(transform);
                self.stats.transforms_applied += 1;
            }
            None => {
                self.stats.transforms_dropped += 1;
                trace!(network_id = network_id, "Transform for unspawned token dropped");
            }
        }
        Ok(())
    }

    /// Overwrite the mirror entry, then update or spawn the visual
    pub fn apply_state<V: TokenVisual>(
        &mut self,
        network_id: NetworkId,
        snapshot: TokenSnapshot,
        scene: Option<&mut Scene<V>>,
    ) -> Result<Option<SpawnRequest>> {
        let mut state = TokenState::from_snapshot(snapshot);
        if state.network_id != network_id {
            if !state.network_id.is_empty() {
                debug!(
                    network_id = %network_id,
                    snapshot_id = %state.network_id,
                    "Snapshot id differs from event id, using event id"
                );
            }
            state.network_id = network_id;
        }
        self.mirror.upsert(state.clone());

        let scene = scene.ok_or(SyncError::MissingCollaborator("scene"))?;
        if scene.is_loading() {
            self.stats.states_deferred += 1;
            trace!(network_id = %state.network_id, "Scene loading, state kept in mirror only");
            return Ok(None);
        }

        if let Some(visual) = scene.visuals.get_mut(state.network_id.as_str()) {
            visual.apply_state(&state);
            self.stats.states_applied += 1;
            return Ok(None);
        }

        self.request_spawn(state)
    }

    fn request_spawn(&mut self, state: TokenState) -> Result<Option<SpawnRequest>> {
        if !self.pending.begin(&state.network_id) {
            self.stats.spawns_coalesced += 1;
            debug!(network_id = %state.network_id, "Spawn already pending, coalesced");
            return Ok(None);
        }
        if !state.has_usable_identity() {
            self.pending.complete(state.network_id.as_str());
            return Err(SyncError::MissingIdentity {
                network_id: state.network_id.to_string(),
            });
        }
        self.stats.spawns_requested += 1;
        debug!(
            network_id = %state.network_id,
            identity = %state.identity(),
            "Requesting spawn"
        );
        Ok(Some(SpawnRequest::new(state)))
    }

    /// Delete the mirror entry and tear down the visual if present
    pub fn apply_removal<V: TokenVisual>(
        &mut self,
        network_id: &str,
        scene: Option<&mut Scene<V>>,
    ) -> Result<()> {
        let removed = self.mirror.remove(network_id).is_some();
        let scene = scene.ok_or(SyncError::MissingCollaborator("scene"))?;

        if let Some(mut visual) = scene.visuals.remove(network_id) {
            visual.begin_teardown();
            self.stats.removals += 1;
            debug!(network_id = network_id, "Token removed");
        } else if self.pending.is_pending(network_id) {
            debug!(
                network_id = network_id,
                "Token removed while spawn pending, visual will be discarded"
            );
        } else if !removed {
            trace!(network_id = network_id, "Removal for unknown token ignored");
        }
        Ok(())
    }

    /// Bring every mirror entry onto the scene
    ///
    /// Existing visuals are overwritten fully, missing ones are spawned.
    /// Visuals with no mirror entry are left alone; see `stale_visuals`.
    pub fn reconcile_all<V: TokenVisual>(
        &mut self,
        scene: Option<&mut Scene<V>>,
    ) -> Result<Vec<SpawnRequest>> {
        let scene = scene.ok_or(SyncError::MissingCollaborator("scene"))?;
        if scene.is_loading() {
            self.resync_deferred = true;
            debug!("Scene loading, full reconciliation deferred");
            return Ok(Vec::new());
        }
        self.resync_deferred = false;
        self.stats.full_passes += 1;

        let mut updated = 0usize;
        let mut spawns = Vec::new();
        for state in self.mirror.all() {
            if let Some(visual) = scene.visuals.get_mut(state.network_id.as_str()) {
                visual.apply_state(&state);
                updated += 1;
                continue;
            }
            let network_id = state.network_id.clone();
            match self.request_spawn(state) {
                Ok(Some(request)) => spawns.push(request),
                Ok(None) => {}
                Err(e) => warn!(network_id = %network_id, error = %e, "Skipping token in full pass"),
            }
        }

        debug!(
            tokens = self.mirror.len(),
            updated = updated,
            spawning = spawns.len(),
            "Full reconciliation pass"
        );
        Ok(spawns)
    }

    /// Finish an in-flight spawn
    pub fn complete_spawn<V: TokenVisual>(
        &mut self,
        network_id: &str,
        result: Result<V>,
        scene: Option<&mut Scene<V>>,
    ) -> Result<SpawnOutcome> {
        let coalesced = self.pending.complete(network_id).unwrap_or(0);
        let mut visual = result?;

        let scene = match scene {
            Some(scene) => scene,
            None => {
                visual.begin_teardown();
                return Err(SyncError::MissingCollaborator("scene"));
            }
        };

        let Some(latest) = self.mirror.get(network_id) else {
            visual.begin_teardown();
            let err = SyncError::OrphanedVisual {
                network_id: network_id.to_string(),
            };
            debug!(error = %err, "Spawned token no longer in mirror, discarded");
            return Ok(SpawnOutcome::DiscardedOrphan);
        };

        if scene.visuals.contains(network_id) {
            visual.begin_teardown();
            let err = SyncError::DuplicateSpawn {
                network_id: network_id.to_string(),
            };
            warn!(error = %err, "Discarding duplicate visual");
            return Ok(SpawnOutcome::DiscardedDuplicate);
        }

        // Property events may have arrived while constructing
        if !scene.is_loading() {
            visual.apply_state(&latest);
        }
        scene.visuals.insert(latest.network_id.clone(), visual);
        debug!(
            network_id = network_id,
            coalesced = coalesced,
            "Spawned token registered"
        );
        Ok(SpawnOutcome::Registered)
    }

    /// Run the post-loading full pass
    pub fn loading_finished<V: TokenVisual>(
        &mut self,
        scene: Option<&mut Scene<V>>,
    ) -> Result<Vec<SpawnRequest>> {
        debug!(deferred = self.resync_deferred, "Loading finished");
        self.reconcile_all(scene)
    }

    /// Visuals present in the scene but absent from the mirror
    pub fn stale_visuals<V>(&self, scene: &Scene<V>) -> Vec<NetworkId> {
        scene
            .visuals
            .ids()
            .into_iter()
            .filter(|id| !self.mirror.contains(id.as_str()))
            .collect()
    }
}
