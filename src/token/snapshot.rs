//! Transmission-safe token snapshots
//!
//! A `TokenSnapshot` is the flat, serializable form of a `TokenState`.
//! Vectors travel as `{x, y, z}` objects; every key is optional on decode and
//! resolves to the same default `TokenState::default()` uses.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::state::{NetworkId, TokenState, Vec3, DEFAULT_MAX_HEALTH, DEFAULT_VARIANT};

fn default_variant() -> String {
    DEFAULT_VARIANT.to_string()
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_health() -> i32 {
    DEFAULT_MAX_HEALTH
}

fn default_true() -> bool {
    true
}

/// Flat snapshot of one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    #[serde(default)]
    pub network_id: NetworkId,
    #[serde(default)]
    pub pack_id: String,
    #[serde(default)]
    pub asset_id: String,
    #[serde(default = "default_variant")]
    pub variant_id: String,

    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,

    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub is_player_controlled: bool,
    #[serde(default)]
    pub character_id: String,

    #[serde(default = "default_health")]
    pub max_health: i32,
    #[serde(default = "default_health")]
    pub current_health: i32,
    #[serde(default = "default_true")]
    pub is_alive: bool,

    #[serde(default = "default_true")]
    pub is_visible_to_players: bool,
    #[serde(default)]
    pub is_hidden_from_gm: bool,

    #[serde(default)]
    pub status_effects: Vec<String>,
}

impl Default for TokenSnapshot {
    fn default() -> Self {
        TokenState::default().to_snapshot()
    }
}

impl TokenSnapshot {
    /// Encode as a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON string; absent keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

impl TokenState {
    /// Convert into the flat transmission form
    pub fn to_snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            network_id: self.network_id.clone(),
            pack_id: self.pack_id.clone(),
            asset_id: self.asset_id.clone(),
            variant_id: self.variant_id.clone(),
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            token_name: self.token_name.clone(),
            is_player_controlled: self.is_player_controlled,
            character_id: self.character_id.clone(),
            max_health: self.max_health,
            current_health: self.current_health,
            is_alive: self.is_alive,
            is_visible_to_players: self.is_visible_to_players,
            is_hidden_from_gm: self.is_hidden_from_gm,
            status_effects: self.status_effects.clone(),
        }
    }

    /// Rebuild a state from its transmission form
    pub fn from_snapshot(snapshot: TokenSnapshot) -> Self {
        Self {
            network_id: snapshot.network_id,
            pack_id: snapshot.pack_id,
            asset_id: snapshot.asset_id,
            variant_id: snapshot.variant_id,
            position: snapshot.position,
            rotation: snapshot.rotation,
            scale: snapshot.scale,
            token_name: snapshot.token_name,
            is_player_controlled: snapshot.is_player_controlled,
            character_id: snapshot.character_id,
            max_health: snapshot.max_health,
            current_health: snapshot.current_health,
            is_alive: snapshot.is_alive,
            is_visible_to_players: snapshot.is_visible_to_players,
            is_hidden_from_gm: snapshot.is_hidden_from_gm,
            status_effects: snapshot.status_effects,
        }
    }
}

impl From<TokenSnapshot> for TokenState {
    fn from(snapshot: TokenSnapshot) -> Self {
        TokenState::from_snapshot(snapshot)
    }
}

impl From<&TokenState> for TokenSnapshot {
    fn from(state: &TokenState) -> Self {
        state.to_snapshot()
    }
}
