#![forbid(unsafe_code)]

//! Blockwork engine.
//!
//! The asynchronous spatial-mutation core: brushes submit operations, the
//! scheduler computes them on worker threads, applies them back to the
//! live grid in tick-bounded chunks on the authoritative thread, and every
//! destructive change lands in a bounded per-brush undo history.
//!
//! # Key Components
//!
//! - [`OperationManager`] - the single scheduler: pending queue, calculate
//!   dispatch, budgeted apply, shutdown lifecycle
//! - [`Operation`] - the four-capability contract every mutation kind
//!   implements (calculate / test / apply_step / dispose)
//! - [`History`] / [`SharedHistory`] - bounded per-brush record stack with
//!   FIFO eviction
//! - [`ActorSession`] / [`ActorLock`] - per-actor mutual exclusion and
//!   status reporting
//! - [`UndoOperation`], [`PlaceOperation`], [`CopyOperation`] - built-in
//!   operation kinds; undo rides the same scheduler path as forward work
//! - [`Brush`] - the contract external tools implement to produce
//!   operations
//!
//! # How it fits in the system
//! The host owns the authoritative tick loop and the live grid; it calls
//! [`OperationManager::tick`] once per simulation tick and
//! [`OperationManager::finish`]/[`OperationManager::reset`] at shutdown,
//! in that order. Everything else flows through operation submissions.

pub mod brush;
pub mod cancellation;
pub mod history;
pub mod manager;
pub mod operation;
pub mod operations;
pub mod session;
pub mod snapshot;

mod executor;

pub use brush::{Brush, UndoError};
pub use cancellation::{CancellationSource, CancellationToken};
pub use history::{History, HistoryError, SharedHistory};
pub use manager::{ManagerConfig, ManagerStats, OperationManager, SubmitError};
pub use operation::{Operation, OperationError, Outcome, Phase, Progress};
pub use operations::{
    CopyOperation, CopySink, Filter, PlaceOperation, Placement, PlacementProducer, UndoOperation,
};
pub use session::{ActorLock, ActorSession, StatusNote, StatusSink};
pub use snapshot::{BlockSnapshot, Record};
