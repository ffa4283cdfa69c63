//! Dirty field flags
//!
//! Tracks which aspects of a token changed since it was last flushed to
//! recipients.

use bitflags::bitflags;

use crate::token::diff::{TokenDiff, TokenField};

bitflags! {
    /// Flags indicating which token fields need to be synchronized
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFields: u16 {
        const NONE = 0;
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const SCALE = 1 << 2;
        const CURRENT_HEALTH = 1 << 3;
        const MAX_HEALTH = 1 << 4;
        const IS_ALIVE = 1 << 5;
        const VISIBLE_TO_PLAYERS = 1 << 6;
        const HIDDEN_FROM_GM = 1 << 7;
        const STATUS_EFFECTS = 1 << 8;

        const TRANSFORM = Self::POSITION.bits() | Self::ROTATION.bits() | Self::SCALE.bits();
        const VISIBILITY = Self::VISIBLE_TO_PLAYERS.bits() | Self::HIDDEN_FROM_GM.bits();
    }
}

impl Default for DirtyFields {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<TokenField> for DirtyFields {
    fn from(field: TokenField) -> Self {
        match field {
            TokenField::Position => Self::POSITION,
            TokenField::Rotation => Self::ROTATION,
            TokenField::Scale => Self::SCALE,
            TokenField::CurrentHealth => Self::CURRENT_HEALTH,
            TokenField::MaxHealth => Self::MAX_HEALTH,
            TokenField::IsAlive => Self::IS_ALIVE,
            TokenField::IsVisibleToPlayers => Self::VISIBLE_TO_PLAYERS,
            TokenField::IsHiddenFromGm => Self::HIDDEN_FROM_GM,
            TokenField::StatusEffects => Self::STATUS_EFFECTS,
        }
    }
}

impl DirtyFields {
    pub fn from_diff(diff: &TokenDiff) -> Self {
        diff.fields()
            .fold(Self::NONE, |flags, field| flags | Self::from(field))
    }

    pub fn has_update(&self) -> bool {
        !self.is_empty()
    }

    pub fn needs_transform(&self) -> bool {
        self.intersects(Self::TRANSFORM)
    }

    pub fn needs_property(&self) -> bool {
        !self.difference(Self::TRANSFORM).is_empty()
    }

    /// Whether a visibility flag changed, requiring per-recipient re-validation
    pub fn visibility_changed(&self) -> bool {
        self.intersects(Self::VISIBILITY)
    }

    pub fn clear(&mut self) {
        *self = Self::NONE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::diff::diff;
    use crate::token::state::{TokenState, Vec3};

    #[test]
    fn test_default_is_clean() {
        let flags = DirtyFields::default();
        assert!(!flags.has_update());
        assert!(!flags.needs_transform());
        assert!(!flags.needs_property());
    }

    #[test]
    fn test_from_diff() {
        let a = TokenState::default();
        let mut b = a.clone();
        b.rotation = Vec3::new(0.0, 45.0, 0.0);
        b.is_visible_to_players = false;
        let flags = DirtyFields::from_diff(&diff(&a, &b));
        assert!(flags.contains(DirtyFields::ROTATION));
        assert!(flags.needs_transform());
        assert!(flags.needs_property());
        assert!(flags.visibility_changed());
    }

    #[test]
    fn test_transform_only_needs_no_property() {
        let mut flags = DirtyFields::POSITION | DirtyFields::SCALE;
        assert!(flags.needs_transform());
        assert!(!flags.needs_property());
        flags.clear();
        assert_eq!(flags, DirtyFields::NONE);
    }
}
