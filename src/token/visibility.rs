//! Per-recipient visibility rules
//!
//! A GM sees every token except those hidden from the GM; a player sees only
//! tokens visible to players. The two flags are independent.

use serde::{Deserialize, Serialize};

use super::state::TokenState;

/// Class of a recipient for visibility purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientClass {
    Gm,
    Player,
}

impl RecipientClass {
    pub fn from_is_gm(is_gm: bool) -> Self {
        if is_gm {
            RecipientClass::Gm
        } else {
            RecipientClass::Player
        }
    }

    pub fn is_gm(&self) -> bool {
        matches!(self, RecipientClass::Gm)
    }
}

impl std::fmt::Display for RecipientClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientClass::Gm => write!(f, "GM"),
            RecipientClass::Player => write!(f, "Player"),
        }
    }
}

impl TokenState {
    /// Whether an authoritative sender may transmit this state to a recipient
    pub fn should_sync_to_client(&self, is_gm: bool) -> bool {
        if is_gm {
            !self.is_hidden_from_gm
        } else {
            self.is_visible_to_players
        }
    }

    pub fn is_visible_to(&self, class: RecipientClass) -> bool {
        self.should_sync_to_client(class.is_gm())
    }
}
