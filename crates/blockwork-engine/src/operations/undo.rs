#![forbid(unsafe_code)]

//! Undo as an operation.
//!
//! Wraps a record already popped from history and inverse-applies it:
//! each snapshot's prior state is written back, in reverse capture order,
//! so repeated overwrites of the same position unwind correctly. Restores
//! carry no side-effect flags.
//!
//! A replay never commits anything back to history: the record was
//! consumed when it was popped, and an interrupted undo leaves the
//! already-restored suffix in place.

use blockwork_core::{ActorId, ChangeFlags, Grid};

use crate::cancellation::CancellationToken;
use crate::history::SharedHistory;
use crate::operation::{Operation, OperationError, Outcome, Progress};
use crate::session::StatusSink;
use crate::snapshot::Record;

/// Restores a popped record, newest capture first.
pub struct UndoOperation {
    record: Record,
    history: SharedHistory,
    actor: ActorId,
    status: StatusSink,
    cancel: CancellationToken,
    restored: usize,
}

impl UndoOperation {
    /// Wrap a record popped from `history` for replay on behalf of
    /// `actor`.
    #[must_use]
    pub fn new(record: Record, history: SharedHistory, actor: ActorId) -> Self {
        Self {
            record,
            history,
            actor,
            status: StatusSink::disconnected(),
            cancel: CancellationToken::never(),
            restored: 0,
        }
    }

    /// Report status through `status`.
    #[must_use]
    pub fn with_status(mut self, status: StatusSink) -> Self {
        self.status = status;
        self
    }

    /// Observe `cancel` for cooperative cancellation.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Operation for UndoOperation {
    fn label(&self) -> &str {
        "undo"
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn calculate(&mut self) -> Result<(), OperationError> {
        // The targets were captured when the record was applied; nothing
        // to derive.
        Ok(())
    }

    fn apply_step(
        &mut self,
        grid: &mut dyn Grid,
        budget: usize,
    ) -> Result<Progress, OperationError> {
        let total = self.record.len();
        let mut performed = 0;

        while performed < budget && self.restored < total {
            if self.cancel.is_cancelled() {
                break;
            }
            // Restore back-to-front: newest capture first.
            let index = total - 1 - self.restored;
            let Some(snapshot) = self.record.get(index).copied() else {
                break;
            };
            grid.write(snapshot.position(), snapshot.prior(), ChangeFlags::empty())?;
            self.restored += 1;
            performed += 1;
        }

        Ok(Progress::new(performed, total - self.restored))
    }

    fn dispose(&mut self, outcome: Outcome) {
        let (size, max) = self.history.with(|h| (h.size(), h.max()));
        match outcome {
            Outcome::Completed => {
                self.status
                    .notify(self.actor, format!("undo complete ({size}/{max})"));
            }
            Outcome::Cancelled => {
                self.status.notify(
                    self.actor,
                    format!(
                        "undo cancelled after {} of {} restores",
                        self.restored,
                        self.record.len()
                    ),
                );
            }
            Outcome::Failed(err) => {
                self.status
                    .notify(self.actor, format!("undo failed: {err}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationSource;
    use crate::snapshot::BlockSnapshot;
    use blockwork_core::{BlockState, MemoryGrid, Position, Region};

    fn grid() -> MemoryGrid {
        MemoryGrid::new(Region::new(
            Position::new(-16, -16, -16),
            Position::new(16, 16, 16),
        ))
    }

    fn record_of(writes: &[(i32, u32, u32)]) -> Record {
        writes
            .iter()
            .map(|&(x, prior, new)| {
                BlockSnapshot::new(
                    Position::new(x, 0, 0),
                    BlockState::new(prior),
                    BlockState::new(new),
                )
            })
            .collect()
    }

    #[test]
    fn restores_prior_states() {
        let mut g = grid();
        for x in 0..4 {
            g.write(Position::new(x, 0, 0), BlockState::new(9), ChangeFlags::empty())
                .unwrap();
        }
        let record = record_of(&[(0, 1, 9), (1, 2, 9), (2, 3, 9), (3, 4, 9)]);
        let mut op = UndoOperation::new(record, SharedHistory::new(4), ActorId::new(1));

        op.calculate().unwrap();
        let progress = op.apply_step(&mut g, usize::MAX).unwrap();
        assert!(progress.is_done());
        assert_eq!(progress.performed, 4);
        for x in 0..4 {
            assert_eq!(
                g.read(Position::new(x, 0, 0)).unwrap(),
                BlockState::new((x + 1) as u32)
            );
        }
    }

    #[test]
    fn restores_in_reverse_capture_order() {
        // Two captures at the same position: applying wrote 1 then 2, so
        // the record holds prior=0 (for the 1-write) then prior=1 (for
        // the 2-write). Reverse restore must end at 0, not 1.
        let mut g = grid();
        g.write(Position::ZERO, BlockState::new(2), ChangeFlags::empty())
            .unwrap();
        let record = record_of(&[(0, 0, 1), (0, 1, 2)]);
        let mut op = UndoOperation::new(record, SharedHistory::new(4), ActorId::new(1));

        op.apply_step(&mut g, usize::MAX).unwrap();
        assert_eq!(g.read(Position::ZERO).unwrap(), BlockState::new(0));
    }

    #[test]
    fn budget_bounds_each_step() {
        let mut g = grid();
        let record = record_of(&[(0, 1, 9), (1, 1, 9), (2, 1, 9), (3, 1, 9), (4, 1, 9)]);
        let mut op = UndoOperation::new(record, SharedHistory::new(4), ActorId::new(1));

        let progress = op.apply_step(&mut g, 2).unwrap();
        assert_eq!(progress.performed, 2);
        assert_eq!(progress.remaining, 3);
        assert_eq!(g.writes(), 2);

        let progress = op.apply_step(&mut g, 2).unwrap();
        assert_eq!(progress.remaining, 1);

        let progress = op.apply_step(&mut g, 2).unwrap();
        assert!(progress.is_done());
        assert_eq!(g.writes(), 5);
    }

    #[test]
    fn cancellation_stops_between_writes() {
        let mut g = grid();
        let record = record_of(&[(0, 1, 9), (1, 1, 9), (2, 1, 9)]);
        let source = CancellationSource::new();
        let mut op = UndoOperation::new(record, SharedHistory::new(4), ActorId::new(1))
            .with_cancel(source.token());

        source.cancel();
        let progress = op.apply_step(&mut g, usize::MAX).unwrap();
        assert_eq!(progress.performed, 0);
        assert_eq!(progress.remaining, 3);
        assert_eq!(g.writes(), 0);
    }

    #[test]
    fn dispose_reports_history_depth() {
        let (session, rx) = crate::session::ActorSession::new(ActorId::new(7));
        let history = SharedHistory::new(5);
        history.push(record_of(&[(0, 0, 1)]));

        let mut op = UndoOperation::new(
            record_of(&[(1, 0, 1)]),
            history,
            session.id(),
        )
        .with_status(session.status().clone());

        op.dispose(Outcome::Completed);
        assert_eq!(rx.try_recv().unwrap().text, "undo complete (1/5)");
    }
}
