//! Visual collaborators
//!
//! The reconciler drives visuals it does not own the rendering of:
//! - `TokenVisual` - one rendered token instance
//! - `VisualRegistry` - id → visual lookup held by the play controller
//! - `LoadingFlag` / `LoadingGate` - the "scene is still being built" flag
//! - `Scene` - registry plus gate, handed to the reconciler per event

use std::collections::HashMap;

use tokio::sync::watch;

use crate::token::state::{NetworkId, TokenState, Transform};

/// A rendered token instance
pub trait TokenVisual: Send {
    /// Set the transform the visual smoothly moves toward
    fn set_interpolation_target(&mut self, transform: Transform);

    /// Apply a full state instantly (no smoothing)
    fn apply_state(&mut self, state: &TokenState);

    /// Start the animated teardown; the registry drops the instance afterwards
    fn begin_teardown(&mut self);
}

/// Lookup from network id to visual instance
#[derive(Debug)]
pub struct VisualRegistry<V> {
    visuals: HashMap<NetworkId, V>,
}

impl<V> Default for VisualRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> VisualRegistry<V> {
    pub fn new() -> Self {
        Self {
            visuals: HashMap::new(),
        }
    }

    pub fn get(&self, network_id: &str) -> Option<&V> {
        self.visuals.get(network_id)
    }

    pub fn get_mut(&mut self, network_id: &str) -> Option<&mut V> {
        self.visuals.get_mut(network_id)
    }

    pub fn contains(&self, network_id: &str) -> bool {
        self.visuals.contains_key(network_id)
    }

    pub fn insert(&mut self, network_id: NetworkId, visual: V) -> Option<V> {
        self.visuals.insert(network_id, visual)
    }

    pub fn remove(&mut self, network_id: &str) -> Option<V> {
        self.visuals.remove(network_id)
    }

    /// Registered ids, ordered
    pub fn ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.visuals.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NetworkId, &V)> {
        self.visuals.iter()
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }
}

/// Writer half of the loading flag, held by whatever builds the scene
#[derive(Debug)]
pub struct LoadingFlag {
    tx: watch::Sender<bool>,
}

impl LoadingFlag {
    pub fn new(loading: bool) -> Self {
        let (tx, _rx) = watch::channel(loading);
        Self { tx }
    }

    pub fn gate(&self) -> LoadingGate {
        LoadingGate {
            rx: self.tx.subscribe(),
        }
    }

    pub fn begin(&self) {
        self.tx.send_replace(true);
    }

    pub fn finish(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_loading(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for LoadingFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Reader half of the loading flag
#[derive(Debug, Clone)]
pub struct LoadingGate {
    rx: watch::Receiver<bool>,
}

impl LoadingGate {
    /// A gate that never reports loading
    pub fn idle() -> Self {
        LoadingFlag::new(false).gate()
    }

    pub fn is_loading(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until loading falls from set to clear
    ///
    /// Returns `false` if the flag's writer is gone.
    pub async fn wait_finished(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            if !*self.rx.borrow_and_update() {
                return true;
            }
        }
    }
}

/// The visual side of a client: registry plus loading gate
#[derive(Debug)]
pub struct Scene<V> {
    pub visuals: VisualRegistry<V>,
    loading: LoadingGate,
}

impl<V> Scene<V> {
    pub fn new(loading: LoadingGate) -> Self {
        Self {
            visuals: VisualRegistry::new(),
            loading,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    pub fn loading_gate(&self) -> LoadingGate {
        self.loading.clone()
    }
}

/// Headless visual that records what was applied to it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryVisual {
    pub state: TokenState,
    pub interpolation_target: Option<Transform>,
    pub applied_count: u32,
    pub tearing_down: bool,
}

impl MemoryVisual {
    pub fn new(state: &TokenState) -> Self {
        let mut visual = Self::default();
        visual.apply_state(state);
        visual
    }

    /// Transform the visual is heading toward
    pub fn target(&self) -> Transform {
        self.interpolation_target
            .unwrap_or_else(|| self.state.transform())
    }
}

impl TokenVisual for MemoryVisual {
    fn set_interpolation_target(&mut self, transform: Transform) {
        self.interpolation_target = Some(transform);
    }

    fn apply_state(&mut self, state: &TokenState) {
        self.state = state.clone();
        // Instant placement replaces any pending smoothing
        self.interpolation_target = None;
        self.applied_count += 1;
    }

    fn begin_teardown(&mut self) {
        self.tearing_down = true;
    }
}
