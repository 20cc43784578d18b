#![forbid(unsafe_code)]

//! Cooperative cancellation for in-flight operations.
//!
//! A [`CancellationSource`] is held by whoever may abort an operation (the
//! brush that submitted it, or the host); the cloneable
//! [`CancellationToken`] travels with the operation and is polled at phase
//! boundaries and between individual block writes. Cancellation is purely
//! advisory: nothing is interrupted mid-write, and a set flag can never be
//! un-set.
//!
//! Dropping the source does **not** cancel outstanding tokens, so a brush
//! can fire-and-forget an operation without aborting it on scope exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The controlling half: call [`cancel`](Self::cancel) to request
/// cancellation of every token derived from this source.
#[derive(Debug)]
pub struct CancellationSource {
    flag: Arc<AtomicBool>,
}

/// The observing half carried by an operation.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationSource {
    /// Create a new, uncancelled source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Derive a token observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            flag: Arc::clone(&self.flag),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token with no source; it can never become cancelled. Useful for
    /// operations that offer no way to abort.
    #[must_use]
    pub fn never() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether cancellation has been requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
