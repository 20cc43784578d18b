#![forbid(unsafe_code)]

//! The operation capability contract and lifecycle vocabulary.
//!
//! Every unit of world mutation — paste, generated fill, undo — implements
//! [`Operation`] and is driven through the same phases by the scheduler:
//!
//! ```text
//! Queued → Calculating → Tested → Applying → Completed
//!              │                     │
//!              └──────► Cancelled ◄──┘        (or Failed)
//! ```
//!
//! `calculate` runs on a worker thread and must not touch the grid.
//! `test` and `apply_step` run on the authoritative thread. `apply_step`
//! is the only phase allowed to mutate the grid, and it re-enters across
//! ticks until it reports no remaining work. `dispose` runs exactly once
//! on every exit path.

use std::fmt;

use blockwork_core::{Grid, GridError};

/// Lifecycle phase of a managed operation. Transitions never skip a
/// phase; `Applying` re-enters itself across scheduler ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepted, waiting for calculate dispatch.
    Queued,
    /// `calculate()` running on a worker thread.
    Calculating,
    /// Calculation done, pre-flight passed, waiting for apply budget.
    Tested,
    /// Writing to the grid in budgeted chunks.
    Applying,
    /// Terminal: all planned work applied.
    Completed,
    /// Terminal: cancelled cooperatively (or rejected pre-flight).
    Cancelled,
    /// Terminal: calculation or a grid write failed.
    Failed,
}

impl Phase {
    /// Whether the phase is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Calculating => "calculating",
            Self::Tested => "tested",
            Self::Applying => "applying",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How an operation terminated, handed to [`Operation::dispose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every planned change was applied.
    Completed,
    /// Cancelled before or during apply; any partial writes stand and are
    /// recorded so the actor can undo them.
    Cancelled,
    /// Calculation or a grid write failed; partial writes stand and are
    /// recorded.
    Failed(OperationError),
}

/// Work accounting returned by one [`Operation::apply_step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Block changes (or reads, for capture operations) performed in this
    /// step. Counted against the tick budget.
    pub performed: usize,
    /// Work items still outstanding; 0 signals apply completion.
    pub remaining: usize,
}

impl Progress {
    /// Progress with outstanding work.
    #[must_use]
    pub const fn new(performed: usize, remaining: usize) -> Self {
        Self {
            performed,
            remaining,
        }
    }

    /// Progress that finishes the apply phase.
    #[must_use]
    pub const fn done(performed: usize) -> Self {
        Self {
            performed,
            remaining: 0,
        }
    }

    /// Whether the apply phase is finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

/// Errors raised by operation phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The asynchronous compute phase failed. No grid writes occurred.
    Calculation(String),
    /// Pre-flight validation declined the operation. No grid writes
    /// occurred.
    Rejected(String),
    /// A grid access failed mid-apply. Writes already made stand.
    Grid(GridError),
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calculation(msg) => write!(f, "calculation failed: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::Grid(err) => write!(f, "grid access failed: {err}"),
        }
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Grid(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GridError> for OperationError {
    fn from(err: GridError) -> Self {
        Self::Grid(err)
    }
}

/// One queued unit of world mutation.
///
/// The scheduler depends only on this capability set; concrete mutation
/// semantics live entirely in implementations.
pub trait Operation: Send {
    /// Short kind name for logs and status text ("paste", "undo", ...).
    fn label(&self) -> &str {
        "operation"
    }

    /// Cooperative cancellation flag, polled before and during every
    /// phase. Once true the scheduler skips remaining work and disposes.
    fn is_cancelled(&self) -> bool;

    /// Derive the full set of target changes from the operation's
    /// semantics. Runs on a worker thread; must not touch the grid.
    fn calculate(&mut self) -> Result<(), OperationError>;

    /// Pre-flight validation against current grid state, on the
    /// authoritative thread, before any write. An error cancels the
    /// operation without side effects.
    fn test(&mut self, grid: &dyn Grid) -> Result<(), OperationError> {
        let _ = grid;
        Ok(())
    }

    /// Perform up to `budget` units of work against the grid on the
    /// authoritative thread. Each write must read the prior state
    /// immediately beforehand and capture both into the in-progress
    /// record; a capture-and-write pair is indivisible.
    fn apply_step(&mut self, grid: &mut dyn Grid, budget: usize)
    -> Result<Progress, OperationError>;

    /// Terminal hook, invoked exactly once whatever the exit path:
    /// commit the accumulated record (when at least one write occurred
    /// and this is not an undo replay) and report status to the actor.
    /// The scheduler releases the actor lock afterwards.
    fn dispose(&mut self, outcome: Outcome);
}
