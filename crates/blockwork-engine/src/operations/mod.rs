#![forbid(unsafe_code)]

//! Built-in operation kinds.
//!
//! All three ride the normal scheduler path — including undo, which is an
//! ordinary operation with the same budget discipline as forward work.

pub mod copy;
pub mod place;
pub mod undo;

pub use copy::{CopyOperation, CopySink};
pub use place::{Filter, PlaceOperation, Placement, PlacementProducer};
pub use undo::UndoOperation;
