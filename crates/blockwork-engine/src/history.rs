#![forbid(unsafe_code)]

//! Bounded per-brush undo history.
//!
//! Each brush owns one [`History`]: a FIFO-bounded stack of [`Record`]s.
//! Pushing past capacity silently evicts the oldest record — eviction is
//! the only way records leave the history other than being popped for
//! undo.
//!
//! # Invariants
//!
//! 1. `size() <= max()` after every operation.
//! 2. Push appends at the newest end; eviction removes index 0 only.
//! 3. No merging: one apply pushes exactly one record, one undo pops
//!    exactly one record.
//!
//! ```text
//! max = 3        push(R4)
//! ┌──────────────────┐      ┌──────────────────┐
//! │ [R1, R2, R3]     │  →   │ [R2, R3, R4]     │   R1 evicted
//! └──────────────────┘      └──────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::snapshot::Record;

/// Bounded record stack. Oldest records are evicted, never popped.
#[derive(Debug)]
pub struct History {
    records: VecDeque<Record>,
    max_size: usize,
}

impl History {
    /// Create a history holding at most `max_size` records.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(max_size.min(64)),
            max_size,
        }
    }

    /// Append a record as the newest entry, evicting the oldest when the
    /// bound is exceeded. O(1) amortized.
    pub fn push(&mut self, record: Record) {
        self.records.push_back(record);
        while self.records.len() > self.max_size {
            if let Some(evicted) = self.records.pop_front() {
                tracing::debug!(
                    target: "blockwork.history",
                    snapshots = evicted.len(),
                    max = self.max_size,
                    "evicted oldest undo record"
                );
            }
        }
    }

    /// Remove and return the most recently pushed record.
    pub fn pop_newest(&mut self) -> Result<Record, HistoryError> {
        self.records.pop_back().ok_or(HistoryError::Empty)
    }

    /// Whether an undo request can be satisfied.
    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.records.is_empty()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// The capacity fixed at construction.
    #[must_use]
    pub fn max(&self) -> usize {
        self.max_size
    }

    /// The oldest surviving record, if any. For progress reporting.
    #[must_use]
    pub fn oldest(&self) -> Option<&Record> {
        self.records.front()
    }
}

/// Errors from history access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// Undo requested with nothing to undo.
    Empty,
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no more history to undo"),
        }
    }
}

impl std::error::Error for HistoryError {}

/// Cheap-clone handle to a [`History`].
///
/// A brush owns the handle and lends clones to its in-flight operations so
/// `dispose` can commit the accumulated record. The per-actor operation
/// lock guarantees the mutex is never contended; locking exists to make
/// the handle `Send` for the calculate phase, not for concurrency.
#[derive(Debug, Clone)]
pub struct SharedHistory {
    inner: Arc<Mutex<History>>,
}

impl SharedHistory {
    /// Create a history bounded at `max_size` and wrap it in a handle.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(History::new(max_size))),
        }
    }

    /// Run `f` with exclusive access to the underlying history.
    pub fn with<R>(&self, f: impl FnOnce(&mut History) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// See [`History::push`].
    pub fn push(&self, record: Record) {
        self.with(|h| h.push(record));
    }

    /// See [`History::pop_newest`].
    pub fn pop_newest(&self) -> Result<Record, HistoryError> {
        self.with(History::pop_newest)
    }

    /// See [`History::has_next`].
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.with(|h| h.has_next())
    }

    /// See [`History::size`].
    #[must_use]
    pub fn size(&self) -> usize {
        self.with(|h| h.size())
    }

    /// See [`History::max`].
    #[must_use]
    pub fn max(&self) -> usize {
        self.with(|h| h.max())
    }
}
