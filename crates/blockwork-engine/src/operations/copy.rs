#![forbid(unsafe_code)]

//! Region capture into a clipboard-style buffer.
//!
//! Copying never writes, but region reads still have to happen on the
//! authoritative thread, so capture is modeled as an operation and pays
//! the same tick budget as writes — a huge selection cannot stall the
//! simulation any more than a huge paste can. Zero writes means no undo
//! record is ever committed.

use blockwork_core::{ActorId, Grid, Position, Region};

use crate::cancellation::CancellationToken;
use crate::operation::{Operation, OperationError, Outcome, Progress};
use crate::operations::place::Placement;
use crate::session::StatusSink;

/// Receives the captured buffer when the copy completes. Positions in the
/// buffer are relative to the copy origin, ready for translated pasting.
pub type CopySink = Box<dyn FnOnce(Vec<Placement>) + Send>;

/// Captures every block state in a region.
pub struct CopyOperation {
    region: Region,
    origin: Position,
    cursor: u64,
    buffer: Vec<Placement>,
    sink: Option<CopySink>,
    actor: ActorId,
    status: StatusSink,
    cancel: CancellationToken,
}

impl CopyOperation {
    /// Capture `region`, expressing positions relative to `origin`, and
    /// deliver the buffer to `sink` on completion.
    #[must_use]
    pub fn new(region: Region, origin: Position, sink: CopySink, actor: ActorId) -> Self {
        Self {
            region,
            origin,
            cursor: 0,
            buffer: Vec::new(),
            sink: Some(sink),
            actor,
            status: StatusSink::disconnected(),
            cancel: CancellationToken::never(),
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

    fn remaining(&self) -> usize {
        usize::try_from(self.region.volume().saturating_sub(self.cursor)).unwrap_or(usize::MAX)
    }
}

impl Operation for CopyOperation {
    fn label(&self) -> &str {
        "copy"
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn calculate(&mut self) -> Result<(), OperationError> {
        // Reads may only happen on the authoritative thread, so the whole
        // capture lives in apply_step.
        Ok(())
    }

    fn test(&mut self, grid: &dyn Grid) -> Result<(), OperationError> {
        for corner in [self.region.min(), self.region.max()] {
            if !grid.contains(corner) {
                return Err(OperationError::Rejected(format!(
                    "selection {} leaves the grid",
                    self.region
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
        if self.buffer.is_empty() && self.cursor == 0 {
            let capacity = usize::try_from(self.region.volume()).unwrap_or(0);
            self.buffer.reserve(capacity);
        }

        let mut performed = 0;
        while performed < budget {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(position) = self.region.position_at(self.cursor) else {
                break;
            };
            let state = grid.read(position)?;
            self.buffer.push(Placement {
                position: position - self.origin,
                state,
            });
            self.cursor += 1;
            performed += 1;
        }

        Ok(Progress::new(performed, self.remaining()))
    }

    fn dispose(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed => {
                let captured = self.buffer.len();
                if let Some(sink) = self.sink.take() {
                    sink(std::mem::take(&mut self.buffer));
                }
                self.status
                    .notify(self.actor, format!("copied {captured} blocks"));
            }
            Outcome::Cancelled => {
                self.status.notify(self.actor, "copy cancelled");
            }
            Outcome::Failed(err) => {
                self.status.notify(self.actor, format!("copy failed: {err}"));
            }
        }
    }
}
