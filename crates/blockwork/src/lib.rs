#![forbid(unsafe_code)]

//! Blockwork public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for hosts and
//! brush authors. It re-exports common types from the internal crates and
//! offers a lightweight prelude for day-to-day usage.

// --- Core re-exports -------------------------------------------------------

pub use blockwork_core::{
    ActorId, BlockState, ChangeFlags, Grid, GridError, Position, Region, RegionIter,
};

#[cfg(feature = "test-helpers")]
pub use blockwork_core::MemoryGrid;

// --- Engine re-exports -----------------------------------------------------

pub use blockwork_engine::{
    ActorLock, ActorSession, BlockSnapshot, Brush, CancellationSource, CancellationToken,
    CopyOperation, CopySink, Filter, History, HistoryError, ManagerConfig, ManagerStats,
    Operation, OperationError, OperationManager, Outcome, Phase, PlaceOperation, Placement,
    PlacementProducer, Progress, Record, SharedHistory, StatusNote, StatusSink, SubmitError,
    UndoError, UndoOperation,
};

/// Everything a brush implementation typically needs.
pub mod prelude {
    pub use blockwork_core::{ActorId, BlockState, ChangeFlags, Grid, Position, Region};
    pub use blockwork_engine::{
        ActorSession, Brush, CancellationSource, Filter, Operation, OperationError,
        OperationManager, Outcome, PlaceOperation, Placement, Progress, Record, SharedHistory,
        SubmitError, UndoOperation,
    };
}
