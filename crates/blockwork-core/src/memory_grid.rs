#![forbid(unsafe_code)]

//! In-memory reference grid for tests and examples.

use ahash::AHashMap;

use crate::block::{BlockState, ChangeFlags};
use crate::geometry::{Position, Region};
use crate::grid::{Grid, GridError};

/// A bounded, sparse in-memory [`Grid`].
///
/// Positions that were never written read back as the fill state. Writes
/// outside the bounds fail with [`GridError::OutOfBounds`], which makes
/// this grid useful for exercising the engine's fatal-write path. A write
/// counter records every successful mutation so tests can assert exact
/// tick budgets.
#[derive(Debug, Clone)]
pub struct MemoryGrid {
    bounds: Region,
    blocks: AHashMap<Position, BlockState>,
    fill: BlockState,
    writes: u64,
}

impl MemoryGrid {
    /// Create a grid covering `bounds`, filled with air.
    pub fn new(bounds: Region) -> Self {
        Self {
            bounds,
            blocks: AHashMap::new(),
            fill: BlockState::AIR,
            writes: 0,
        }
    }

    /// Use `fill` as the state of never-written positions.
    #[must_use]
    pub fn with_fill(mut self, fill: BlockState) -> Self {
        self.fill = fill;
        self
    }

    /// The addressable bounds.
    #[must_use]
    pub fn bounds(&self) -> Region {
        self.bounds
    }

    /// Total number of successful writes so far.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Snapshot the full state of a region as `(position, state)` pairs,
    /// in region iteration order. Panics if the region leaves the bounds;
    /// intended for test assertions only.
    pub fn dump(&self, region: Region) -> Vec<(Position, BlockState)> {
        region
            .iter()
            .map(|p| {
                assert!(self.bounds.contains(p), "dump region escapes bounds");
                (p, self.blocks.get(&p).copied().unwrap_or(self.fill))
            })
            .collect()
    }
}

impl Grid for MemoryGrid {
    fn read(&self, position: Position) -> Result<BlockState, GridError> {
        if !self.bounds.contains(position) {
            return Err(GridError::OutOfBounds(position));
        }
        Ok(self.blocks.get(&position).copied().unwrap_or(self.fill))
    }

    fn write(
        &mut self,
        position: Position,
        state: BlockState,
        _flags: ChangeFlags,
    ) -> Result<(), GridError> {
        if !self.bounds.contains(position) {
            return Err(GridError::OutOfBounds(position));
        }
        self.blocks.insert(position, state);
        self.writes += 1;
        Ok(())
    }

    fn contains(&self, position: Position) -> bool {
        self.bounds.contains(position)
    }
}
