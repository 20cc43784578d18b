#![forbid(unsafe_code)]

//! Opaque block states and grid write flags.
//!
//! The engine never inspects what a state *means*; mapping ids to concrete
//! materials (and merging their properties) belongs to the host's registry.

use std::fmt;

use bitflags::bitflags;

/// A compact, opaque block state id.
///
/// Two states are interchangeable exactly when their ids are equal. Id 0 is
/// reserved for air by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockState(u32);

impl BlockState {
    /// The empty/air state.
    pub const AIR: BlockState = BlockState(0);

    /// Create a state from a raw registry id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Whether this is the air state.
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state#{}", self.0)
    }
}

bitflags! {
    /// Side-effect flags attached to a grid write.
    ///
    /// Undo restores with `ChangeFlags::empty()` so that replaying history
    /// does not re-trigger simulation updates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u8 {
        /// Notify adjacent blocks of the change.
        const NEIGHBOR = 1 << 0;
        /// Run physics updates at the written position.
        const PHYSICS = 1 << 1;
        /// Fire observer-style triggers watching the position.
        const OBSERVER = 1 << 2;
    }
}

impl ChangeFlags {
    /// The flag set forward operations use by default.
    #[must_use]
    pub const fn standard() -> Self {
        Self::NEIGHBOR.union(Self::OBSERVER)
    }
}

impl Default for ChangeFlags {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_id_zero() {
        assert!(BlockState::AIR.is_air());
        assert_eq!(BlockState::AIR.id(), 0);
        assert!(!BlockState::new(7).is_air());
    }

    #[test]
    fn states_compare_by_id() {
        assert_eq!(BlockState::new(42), BlockState::new(42));
        assert_ne!(BlockState::new(42), BlockState::new(43));
    }

    #[test]
    fn standard_flags_notify_without_physics() {
        let flags = ChangeFlags::standard();
        assert!(flags.contains(ChangeFlags::NEIGHBOR));
        assert!(flags.contains(ChangeFlags::OBSERVER));
        assert!(!flags.contains(ChangeFlags::PHYSICS));
    }

    #[test]
    fn empty_flags_are_silent() {
        assert!(ChangeFlags::empty().is_empty());
    }
}
