#![forbid(unsafe_code)]

//! The brush contract.
//!
//! Brushes decide *what* to mutate — clipboard paste, stencil raster,
//! generated volumes — and package that decision as operations. The engine
//! only requires that a brush own a history and know how to build its
//! forward operation; the undo flow is shared, because undo is the same
//! for every brush: pop one record, replay it through the scheduler.

use blockwork_core::Position;

use crate::cancellation::CancellationSource;
use crate::manager::{OperationManager, SubmitError};
use crate::history::SharedHistory;
use crate::operations::UndoOperation;
use crate::session::ActorSession;

/// Why an undo request went nowhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoError {
    /// The brush's history is empty.
    NothingToUndo,
    /// Submission was rejected (actor busy or queue full).
    Busy(SubmitError),
}

impl std::fmt::Display for UndoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NothingToUndo => write!(f, "no more history to undo"),
            Self::Busy(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for UndoError {}

impl From<SubmitError> for UndoError {
    fn from(err: SubmitError) -> Self {
        Self::Busy(err)
    }
}

/// A tool that produces operations in response to actor input.
///
/// Implementations typically hold their options (radius, materials,
/// seed, ...) as fields and read the actor's target position when
/// building the forward operation.
pub trait Brush {
    /// The undo history this brush records into.
    fn history(&self) -> &SharedHistory;

    /// Build and submit this brush's forward operation at `target`.
    ///
    /// Returns the cancellation source controlling the submitted
    /// operation; dropping it does not cancel.
    fn apply(
        &mut self,
        manager: &mut OperationManager,
        session: &ActorSession,
        target: Position,
    ) -> Result<CancellationSource, SubmitError>;

    /// Pop the newest record and replay it through the scheduler.
    ///
    /// Rides the normal operation path: the same actor lock, the same
    /// tick budget. If submission is rejected the popped record is put
    /// back, so a failed undo request loses nothing.
    fn undo(
        &mut self,
        manager: &mut OperationManager,
        session: &ActorSession,
    ) -> Result<CancellationSource, UndoError> {
        if session.is_operating() {
            return Err(UndoError::Busy(SubmitError::ActorBusy(session.id())));
        }

        let record = self
            .history()
            .pop_newest()
            .map_err(|_| UndoError::NothingToUndo)?;

        let source = CancellationSource::new();
        let operation = UndoOperation::new(record.clone(), self.history().clone(), session.id())
            .with_status(session.status().clone())
            .with_cancel(source.token());

        match manager.submit(Box::new(operation), session) {
            Ok(()) => Ok(source),
            Err(err) => {
                // Put the record back as the newest entry; nothing ran.
                self.history().push(record);
                Err(err.into())
            }
        }
    }
}
