#![forbid(unsafe_code)]

//! Forward placement: the paste/stencil/fill workhorse.
//!
//! A [`PlaceOperation`] owns a lazy producer that derives the full set of
//! target `(position, state)` pairs during the calculate phase, off the
//! authoritative thread. Apply then walks the placements in budgeted
//! chunks, reading each prior state immediately before writing and
//! capturing both into the record that `dispose` commits to history.
//!
//! Producers encode the brush semantics — a clipboard buffer, a
//! rasterized stencil, generated noise — so the engine stays ignorant of
//! them. Translation and prior-state filtering are applied here because
//! every forward kind shares them.

use blockwork_core::{ActorId, BlockState, ChangeFlags, Grid, Position, Region};

use crate::cancellation::CancellationToken;
use crate::history::SharedHistory;
use crate::operation::{Operation, OperationError, Outcome, Progress};
use crate::session::StatusSink;
use crate::snapshot::{BlockSnapshot, Record};

/// One planned block change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub position: Position,
    pub state: BlockState,
}

/// Lazily derives the placements for one apply. Consumed by the
/// calculate phase on a worker thread; must not touch the grid.
pub type PlacementProducer =
    Box<dyn FnOnce() -> Result<Vec<Placement>, OperationError> + Send>;

/// Predicate over the state already present at a target position,
/// evaluated immediately before each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// Write everywhere.
    #[default]
    Any,
    /// Write only where the prior state equals the given state.
    ReplaceOnly(BlockState),
    /// Write everywhere except where the prior state equals the given
    /// state.
    Preserve(BlockState),
}

impl Filter {
    /// Whether a write over `prior` is admitted.
    #[must_use]
    pub fn admits(&self, prior: BlockState) -> bool {
        match self {
            Self::Any => true,
            Self::ReplaceOnly(state) => prior == *state,
            Self::Preserve(state) => prior != *state,
        }
    }
}

/// Applies a produced set of placements to the grid.
pub struct PlaceOperation {
    label: String,
    producer: Option<PlacementProducer>,
    placements: Vec<Placement>,
    bounds: Option<Region>,
    translation: Position,
    filter: Filter,
    flags: ChangeFlags,
    cursor: usize,
    record: Record,
    history: SharedHistory,
    actor: ActorId,
    status: StatusSink,
    cancel: CancellationToken,
}

impl PlaceOperation {
    /// Create an operation whose targets come from `producer`.
    #[must_use]
    pub fn new(producer: PlacementProducer, history: SharedHistory, actor: ActorId) -> Self {
        Self {
            label: "place".to_string(),
            producer: Some(producer),
            placements: Vec::new(),
            bounds: None,
            translation: Position::ZERO,
            filter: Filter::Any,
            flags: ChangeFlags::standard(),
            cursor: 0,
            record: Record::new(),
            history,
            actor,
            status: StatusSink::disconnected(),
            cancel: CancellationToken::never(),
        }
    }

    /// Create an operation over an already-computed buffer.
    #[must_use]
    pub fn from_placements(
        placements: Vec<Placement>,
        history: SharedHistory,
        actor: ActorId,
    ) -> Self {
        Self::new(Box::new(move || Ok(placements)), history, actor)
    }

    /// Name used in logs and status text ("paste", "fill", ...).
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Translate every produced position by the given vector.
    #[must_use]
    pub fn with_translation(mut self, translation: Position) -> Self {
        self.translation = translation;
        self
    }

    /// Only write where `filter` admits the prior state.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Side-effect flags attached to each write.
    #[must_use]
    pub fn with_flags(mut self, flags: ChangeFlags) -> Self {
        self.flags = flags;
        self
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

impl Operation for PlaceOperation {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn calculate(&mut self) -> Result<(), OperationError> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let mut placements = producer()?;
        for placement in &mut placements {
            placement.position = placement.position.translated(self.translation);
        }

        self.bounds = placements.iter().map(|p| p.position).fold(
            None,
            |bounds: Option<Region>, p| match bounds {
                Some(region) => Some(region.expanded_to(p)),
                None => Some(Region::point(p)),
            },
        );
        self.placements = placements;
        Ok(())
    }

    fn test(&mut self, grid: &dyn Grid) -> Result<(), OperationError> {
        let Some(bounds) = self.bounds else {
            return Ok(());
        };
        for corner in [bounds.min(), bounds.max()] {
            if !grid.contains(corner) {
                return Err(OperationError::Rejected(format!(
                    "target volume {bounds} leaves the grid"
                )));
            }
        }
        Ok(())
    }

    fn apply_step(
        &mut self,
        grid: &mut dyn Grid,
        budget: usize,
    ) -> Result<Progress, OperationError> {
        let total = self.placements.len();
        let mut performed = 0;

        while performed < budget && self.cursor < total {
            if self.cancel.is_cancelled() {
                break;
            }
            let placement = self.placements[self.cursor];

            // Prior read and write form one indivisible pair: nothing may
            // touch the grid between them.
            let prior = grid.read(placement.position)?;
            if self.filter.admits(prior) {
                grid.write(placement.position, placement.state, self.flags)?;
                self.record
                    .push(BlockSnapshot::new(placement.position, prior, placement.state));
            }

            self.cursor += 1;
            performed += 1;
        }

        Ok(Progress::new(performed, total - self.cursor))
    }

    fn dispose(&mut self, outcome: Outcome) {
        let written = self.record.len();
        if written > 0 {
            // Whatever was written is undoable, even after cancellation
            // or a failed write.
            self.history.push(std::mem::take(&mut self.record));
        }

        match outcome {
            Outcome::Completed => {
                self.status.notify(
                    self.actor,
                    format!("{} complete ({written} changes)", self.label),
                );
            }
            Outcome::Cancelled => {
                self.status.notify(
                    self.actor,
                    format!("{} cancelled ({written} changes kept)", self.label),
                );
            }
            Outcome::Failed(err) => {
                self.status
                    .notify(self.actor, format!("{} failed: {err}", self.label));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationSource;
    use blockwork_core::MemoryGrid;

    fn grid() -> MemoryGrid {
        MemoryGrid::new(Region::new(
            Position::new(-16, -16, -16),
            Position::new(16, 16, 16),
        ))
    }

    fn row(len: i32, state: u32) -> Vec<Placement> {
        (0..len)
            .map(|x| Placement {
                position: Position::new(x, 0, 0),
                state: BlockState::new(state),
            })
            .collect()
    }

    #[test]
    fn applies_all_placements_and_records_them() {
        let mut g = grid();
        let history = SharedHistory::new(4);
        let mut op =
            PlaceOperation::from_placements(row(5, 7), history.clone(), ActorId::new(1));

        op.calculate().unwrap();
        op.test(&g).unwrap();
        let progress = op.apply_step(&mut g, usize::MAX).unwrap();
        assert!(progress.is_done());
        assert_eq!(progress.performed, 5);
        op.dispose(Outcome::Completed);

        assert_eq!(g.writes(), 5);
        assert_eq!(history.size(), 1);
        let record = history.pop_newest().unwrap();
        assert_eq!(record.len(), 5);
        assert_eq!(record.get(0).unwrap().prior(), BlockState::AIR);
    }

    #[test]
    fn translation_moves_the_target_volume() {
        let mut g = grid();
        let mut op = PlaceOperation::from_placements(
            row(2, 3),
            SharedHistory::new(4),
            ActorId::new(1),
        )
        .with_translation(Position::new(0, 5, 0));

        op.calculate().unwrap();
        op.apply_step(&mut g, usize::MAX).unwrap();
        assert_eq!(g.read(Position::new(0, 5, 0)).unwrap(), BlockState::new(3));
        assert_eq!(g.read(Position::new(1, 5, 0)).unwrap(), BlockState::new(3));
        assert_eq!(g.read(Position::new(0, 0, 0)).unwrap(), BlockState::AIR);
    }

    #[test]
    fn filter_skips_inadmissible_priors_without_recording() {
        let mut g = grid();
        g.write(Position::new(1, 0, 0), BlockState::new(9), ChangeFlags::empty())
            .unwrap();
        let history = SharedHistory::new(4);
        let mut op = PlaceOperation::from_placements(row(3, 5), history.clone(), ActorId::new(1))
            .with_filter(Filter::ReplaceOnly(BlockState::AIR));

        op.calculate().unwrap();
        let progress = op.apply_step(&mut g, usize::MAX).unwrap();
        op.dispose(Outcome::Completed);

        // All three placements consumed work, but only two admitted.
        assert_eq!(progress.performed, 3);
        assert_eq!(g.read(Position::new(1, 0, 0)).unwrap(), BlockState::new(9));
        assert_eq!(history.pop_newest().unwrap().len(), 2);
    }

    #[test]
    fn producer_failure_surfaces_as_calculation_error() {
        let mut op = PlaceOperation::new(
            Box::new(|| Err(OperationError::Calculation("no materials match".into()))),
            SharedHistory::new(4),
            ActorId::new(1),
        );
        let err = op.calculate().unwrap_err();
        assert!(matches!(err, OperationError::Calculation(_)));
    }

    #[test]
    fn test_rejects_out_of_bounds_volume() {
        let g = grid();
        let mut op = PlaceOperation::from_placements(
            row(2, 1),
            SharedHistory::new(4),
            ActorId::new(1),
        )
        .with_translation(Position::new(100, 0, 0));

        op.calculate().unwrap();
        let err = op.test(&g).unwrap_err();
        assert!(matches!(err, OperationError::Rejected(_)));
    }

    #[test]
    fn cancellation_keeps_partial_record() {
        let mut g = grid();
        let history = SharedHistory::new(4);
        let source = CancellationSource::new();
        let mut op = PlaceOperation::from_placements(row(10, 2), history.clone(), ActorId::new(1))
            .with_cancel(source.token());

        op.calculate().unwrap();
        op.apply_step(&mut g, 4).unwrap();
        source.cancel();
        let progress = op.apply_step(&mut g, usize::MAX).unwrap();
        assert_eq!(progress.performed, 0);
        op.dispose(Outcome::Cancelled);

        assert_eq!(g.writes(), 4);
        assert_eq!(history.pop_newest().unwrap().len(), 4);
    }

    #[test]
    fn empty_producer_completes_without_committing() {
        let mut g = grid();
        let history = SharedHistory::new(4);
        let mut op = PlaceOperation::from_placements(Vec::new(), history.clone(), ActorId::new(1));

        op.calculate().unwrap();
        op.test(&g).unwrap();
        let progress = op.apply_step(&mut g, usize::MAX).unwrap();
        assert!(progress.is_done());
        op.dispose(Outcome::Completed);
        assert_eq!(history.size(), 0);
    }

    #[test]
    fn later_captures_see_earlier_writes() {
        // Two placements at one position: the second snapshot's prior
        // must be the first placement's state, not the original.
        let mut g = grid();
        let history = SharedHistory::new(4);
        let placements = vec![
            Placement {
                position: Position::ZERO,
                state: BlockState::new(1),
            },
            Placement {
                position: Position::ZERO,
                state: BlockState::new(2),
            },
        ];
        let mut op =
            PlaceOperation::from_placements(placements, history.clone(), ActorId::new(1));

        op.calculate().unwrap();
        op.apply_step(&mut g, usize::MAX).unwrap();
        op.dispose(Outcome::Completed);

        let record = history.pop_newest().unwrap();
        assert_eq!(record.get(0).unwrap().prior(), BlockState::AIR);
        assert_eq!(record.get(1).unwrap().prior(), BlockState::new(1));
    }
}
