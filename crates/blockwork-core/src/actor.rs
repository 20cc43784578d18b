#![forbid(unsafe_code)]

//! Stable actor identity.

use std::fmt;

/// Unique identifier for the actor (user session) an operation runs for.
///
/// The host assigns ids with whatever scheme it uses for sessions; the
/// engine only needs them to be stable and hashable for the lifetime of
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Create an id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}
