//! Token state model
//!
//! A `TokenState` is one token's complete snapshot: identity, transform,
//! metadata, health, visibility and status effects. Exactly one authoritative
//! copy lives on the host; every other participant holds a mirrored copy that
//! is only mutated by applying inbound events.

use std::borrow::Borrow;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Variant used when a token does not name one
pub const DEFAULT_VARIANT: &str = "default";

/// Default maximum (and starting) health
pub const DEFAULT_MAX_HEALTH: i32 = 100;

/// Stable identifier of a token, unique among live tokens in a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    /// Wrap an existing identifier (e.g. from level data)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh identifier for a token spawned at runtime
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<str> for NetworkId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for NetworkId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NetworkId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Three-component vector used for position, rotation and scale
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const ONE: Vec3 = Vec3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise comparison within `tolerance`
    pub fn approx_eq(&self, other: &Vec3, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Absolute transform of a token
///
/// Transform samples are memoryless: each one replaces the previous target
/// outright, so a lost or reordered sample only affects smoothness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Selects the visual model instantiated for a token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityTriple {
    pub pack_id: String,
    pub asset_id: String,
    pub variant_id: String,
}

impl IdentityTriple {
    pub fn new(pack_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            pack_id: pack_id.into(),
            asset_id: asset_id.into(),
            variant_id: DEFAULT_VARIANT.to_string(),
        }
    }

    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = variant_id.into();
        self
    }

    /// A spawnable identity names both a pack and an asset
    pub fn is_usable(&self) -> bool {
        !self.pack_id.trim().is_empty() && !self.asset_id.trim().is_empty()
    }
}

impl std::fmt::Display for IdentityTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.pack_id, self.asset_id, self.variant_id)
    }
}

/// One token's complete state
#[derive(Debug, Clone, PartialEq)]
pub struct TokenState {
    pub network_id: NetworkId,

    pub pack_id: String,
    pub asset_id: String,
    pub variant_id: String,

    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,

    pub token_name: String,
    pub is_player_controlled: bool,
    pub character_id: String,

    pub max_health: i32,
    pub current_health: i32,
    /// Set by the caller; never derived from `current_health`
    pub is_alive: bool,

    pub is_visible_to_players: bool,
    pub is_hidden_from_gm: bool,

    /// Ordered effect tags, duplicates allowed
    pub status_effects: Vec<String>,
}

impl Default for TokenState {
    fn default() -> Self {
        Self {
            network_id: NetworkId::default(),
            pack_id: String::new(),
            asset_id: String::new(),
            variant_id: DEFAULT_VARIANT.to_string(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            token_name: String::new(),
            is_player_controlled: false,
            character_id: String::new(),
            max_health: DEFAULT_MAX_HEALTH,
            current_health: DEFAULT_MAX_HEALTH,
            is_alive: true,
            is_visible_to_players: true,
            is_hidden_from_gm: false,
            status_effects: Vec::new(),
        }
    }
}

impl TokenState {
    /// Create a token with the given id and identity, everything else default
    pub fn new(network_id: impl Into<NetworkId>, identity: IdentityTriple) -> Self {
        Self {
            network_id: network_id.into(),
            pack_id: identity.pack_id,
            asset_id: identity.asset_id,
            variant_id: identity.variant_id,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.token_name = name.into();
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_health(mut self, current: i32, max: i32) -> Self {
        self.current_health = current;
        self.max_health = max;
        self
    }

    pub fn with_player_control(mut self, character_id: impl Into<String>) -> Self {
        self.is_player_controlled = true;
        self.character_id = character_id.into();
        self
    }

    pub fn with_visibility(mut self, visible_to_players: bool, hidden_from_gm: bool) -> Self {
        self.is_visible_to_players = visible_to_players;
        self.is_hidden_from_gm = hidden_from_gm;
        self
    }

    pub fn identity(&self) -> IdentityTriple {
        IdentityTriple {
            pack_id: self.pack_id.clone(),
            asset_id: self.asset_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }

    pub fn has_usable_identity(&self) -> bool {
        self.identity().is_usable()
    }

    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.position = transform.position;
        self.rotation = transform.rotation;
        self.scale = transform.scale;
    }

    /// Add a status effect tag (appended, not deduplicated)
    pub fn add_status_effect(&mut self, effect: impl Into<String>) {
        self.status_effects.push(effect.into());
    }

    /// Remove the first occurrence of a status effect tag
    pub fn remove_status_effect(&mut self, effect: &str) -> bool {
        match self.status_effects.iter().position(|e| e == effect) {
            Some(index) => {
                self.status_effects.remove(index);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} '{}' [{}] at {} hp {}/{}",
            self.network_id,
            self.token_name,
            self.identity(),
            self.position,
            self.current_health,
            self.max_health
        )
    }
}
