#![forbid(unsafe_code)]

//! Blockwork core types.
//!
//! This crate holds the leaf vocabulary shared by the engine and by host
//! integrations: integer 3D geometry, opaque block states, grid write
//! flags, the [`Grid`] collaborator contract, and stable actor identity.
//!
//! # Role in Blockwork
//! `blockwork-core` is deliberately small and dependency-light. The engine
//! crate builds the operation lifecycle on top of these types; hosts
//! implement [`Grid`] over their own world storage and hand actors a
//! [`ActorId`]. Nothing in this crate touches threads or scheduling.

pub mod actor;
pub mod block;
pub mod geometry;
pub mod grid;

#[cfg(feature = "test-helpers")]
pub mod memory_grid;

pub use actor::ActorId;
pub use block::{BlockState, ChangeFlags};
pub use geometry::{Position, Region, RegionIter};
pub use grid::{Grid, GridError};

#[cfg(feature = "test-helpers")]
pub use memory_grid::MemoryGrid;
