//! Field-level diffs between token states
//!
//! `diff(a, b)` reports every allow-listed field whose value differs, keyed
//! by field name. Identity and metadata fields never appear in a diff.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::state::{TokenState, Vec3};

/// Fields that participate in diffs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenField {
    Position,
    Rotation,
    Scale,
    CurrentHealth,
    MaxHealth,
    IsAlive,
    IsVisibleToPlayers,
    IsHiddenFromGm,
    StatusEffects,
}

/// The fixed diff allow-list, in wire order
pub const DIFF_FIELDS: [TokenField; 9] = [
    TokenField::Position,
    TokenField::Rotation,
    TokenField::Scale,
    TokenField::CurrentHealth,
    TokenField::MaxHealth,
    TokenField::IsAlive,
    TokenField::IsVisibleToPlayers,
    TokenField::IsHiddenFromGm,
    TokenField::StatusEffects,
];

impl TokenField {
    pub fn name(&self) -> &'static str {
        match self {
            TokenField::Position => "position",
            TokenField::Rotation => "rotation",
            TokenField::Scale => "scale",
            TokenField::CurrentHealth => "current_health",
            TokenField::MaxHealth => "max_health",
            TokenField::IsAlive => "is_alive",
            TokenField::IsVisibleToPlayers => "is_visible_to_players",
            TokenField::IsHiddenFromGm => "is_hidden_from_gm",
            TokenField::StatusEffects => "status_effects",
        }
    }

    /// Read this field's current value from a state
    pub fn value_of(&self, state: &TokenState) -> FieldValue {
        match self {
            TokenField::Position => FieldValue::Vector(state.position),
            TokenField::Rotation => FieldValue::Vector(state.rotation),
            TokenField::Scale => FieldValue::Vector(state.scale),
            TokenField::CurrentHealth => FieldValue::Int(state.current_health),
            TokenField::MaxHealth => FieldValue::Int(state.max_health),
            TokenField::IsAlive => FieldValue::Bool(state.is_alive),
            TokenField::IsVisibleToPlayers => FieldValue::Bool(state.is_visible_to_players),
            TokenField::IsHiddenFromGm => FieldValue::Bool(state.is_hidden_from_gm),
            TokenField::StatusEffects => FieldValue::Tags(state.status_effects.clone()),
        }
    }

    fn differs(&self, a: &TokenState, b: &TokenState) -> bool {
        match self {
            TokenField::Position => a.position != b.position,
            TokenField::Rotation => a.rotation != b.rotation,
            TokenField::Scale => a.scale != b.scale,
            TokenField::CurrentHealth => a.current_health != b.current_health,
            TokenField::MaxHealth => a.max_health != b.max_health,
            TokenField::IsAlive => a.is_alive != b.is_alive,
            TokenField::IsVisibleToPlayers => a.is_visible_to_players != b.is_visible_to_players,
            TokenField::IsHiddenFromGm => a.is_hidden_from_gm != b.is_hidden_from_gm,
            TokenField::StatusEffects => a.status_effects != b.status_effects,
        }
    }
}

impl std::fmt::Display for TokenField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// New value carried by a diff entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    // Tried in order: an empty list must decode as `Tags`, not a defaulted `Vec3`
    Tags(Vec<String>),
    Vector(Vec3),
    Bool(bool),
    Int(i32),
}

/// Mapping of field → new value for every differing allow-listed field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenDiff {
    changes: BTreeMap<TokenField, FieldValue>,
}

impl TokenDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: TokenField) -> Option<&FieldValue> {
        self.changes.get(&field)
    }

    pub fn contains(&self, field: TokenField) -> bool {
        self.changes.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = TokenField> + '_ {
        self.changes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TokenField, &FieldValue)> {
        self.changes.iter()
    }

    pub fn insert(&mut self, field: TokenField, value: FieldValue) {
        self.changes.insert(field, value);
    }

    /// Keep only the entries matching `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(TokenField) -> bool) {
        self.changes.retain(|field, _| keep(*field));
    }

    /// Write every entry into `state`
    ///
    /// Entries whose value type does not match the field are skipped and
    /// reported back.
    pub fn apply_to(&self, state: &mut TokenState) -> Vec<TokenField> {
        let mut rejected = Vec::new();
        for (field, value) in &self.changes {
            let applied = match (field, value) {
                (TokenField::Position, FieldValue::Vector(v)) => {
                    state.position = *v;
                    true
                }
                (TokenField::Rotation, FieldValue::Vector(v)) => {
                    state.rotation = *v;
                    true
                }
                (TokenField::Scale, FieldValue::Vector(v)) => {
                    state.scale = *v;
                    true
                }
                (TokenField::CurrentHealth, FieldValue::Int(n)) => {
                    state.current_health = *n;
                    true
                }
                (TokenField::MaxHealth, FieldValue::Int(n)) => {
                    state.max_health = *n;
                    true
                }
                (TokenField::IsAlive, FieldValue::Bool(b)) => {
                    state.is_alive = *b;
                    true
                }
                (TokenField::IsVisibleToPlayers, FieldValue::Bool(b)) => {
                    state.is_visible_to_players = *b;
                    true
                }
                (TokenField::IsHiddenFromGm, FieldValue::Bool(b)) => {
                    state.is_hidden_from_gm = *b;
                    true
                }
                (TokenField::StatusEffects, FieldValue::Tags(tags)) => {
                    state.status_effects = tags.clone();
                    true
                }
                _ => false,
            };
            if !applied {
                rejected.push(*field);
            }
        }
        rejected
    }
}

/// Compute the allow-listed fields of `b` that differ from `a`
pub fn diff(a: &TokenState, b: &TokenState) -> TokenDiff {
    let mut result = TokenDiff::default();
    for field in DIFF_FIELDS {
        if field.differs(a, b) {
            result.insert(field, field.value_of(b));
        }
    }
    result
}
