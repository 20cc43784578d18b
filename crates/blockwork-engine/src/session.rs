#![forbid(unsafe_code)]

//! Actor sessions: the per-actor operation lock and status channel.
//!
//! The host keeps one [`ActorSession`] per connected actor for the length
//! of that actor's session and passes it by reference when submitting
//! operations. The session owns the actor's busy flag — there is no
//! process-wide actor table — so lock lifetime is scoped to session
//! lifetime and tests can construct sessions freely.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use blockwork_core::ActorId;

/// The per-actor mutual-exclusion flag.
///
/// At most one operation may hold the lock at a time; a second submission
/// while engaged is rejected, not queued. Handles are cheap clones of the
/// same flag so the scheduler can release it from wherever the operation
/// terminates.
#[derive(Debug, Clone)]
pub struct ActorLock {
    engaged: Arc<AtomicBool>,
}

impl ActorLock {
    /// Create a released lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            engaged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Try to engage the lock. Returns `false` if it was already engaged.
    #[must_use]
    pub fn try_engage(&self) -> bool {
        self.engaged
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the lock. Idempotent.
    pub fn release(&self) {
        self.engaged.store(false, Ordering::Release);
    }

    /// Whether an operation currently holds the lock.
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

impl Default for ActorLock {
    fn default() -> Self {
        Self::new()
    }
}

/// A user-facing status line addressed to one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNote {
    pub actor: ActorId,
    pub text: String,
}

/// Best-effort channel for user-facing status text.
///
/// Delivery is fire-and-forget: if the host dropped the receiving end (the
/// actor disconnected), notes vanish silently. Operations must never fail
/// because nobody is listening.
#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: Option<mpsc::Sender<StatusNote>>,
}

impl StatusSink {
    /// A sink that discards every note.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Send a note, ignoring delivery failure.
    pub fn notify(&self, actor: ActorId, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(StatusNote {
                actor,
                text: text.into(),
            });
        }
    }
}

/// One actor's session state: identity, operation lock, status sink.
#[derive(Debug)]
pub struct ActorSession {
    id: ActorId,
    lock: ActorLock,
    status: StatusSink,
}

impl ActorSession {
    /// Create a session whose status notes arrive on the returned
    /// receiver.
    #[must_use]
    pub fn new(id: ActorId) -> (Self, mpsc::Receiver<StatusNote>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                id,
                lock: ActorLock::new(),
                status: StatusSink { tx: Some(tx) },
            },
            rx,
        )
    }

    /// Create a session that discards status notes.
    #[must_use]
    pub fn detached(id: ActorId) -> Self {
        Self {
            id,
            lock: ActorLock::new(),
            status: StatusSink::disconnected(),
        }
    }

    /// The actor's stable identity.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// The actor's operation lock.
    #[must_use]
    pub fn lock(&self) -> &ActorLock {
        &self.lock
    }

    /// The actor's status sink.
    #[must_use]
    pub fn status(&self) -> &StatusSink {
        &self.status
    }

    /// Whether an operation is currently in flight for this actor.
    #[must_use]
    pub fn is_operating(&self) -> bool {
        self.lock.is_engaged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_engages_once() {
        let lock = ActorLock::new();
        assert!(lock.try_engage());
        assert!(!lock.try_engage());
        assert!(lock.is_engaged());
    }

    #[test]
    fn release_allows_re_engage() {
        let lock = ActorLock::new();
        assert!(lock.try_engage());
        lock.release();
        assert!(!lock.is_engaged());
        assert!(lock.try_engage());
    }

    #[test]
    fn clones_share_the_flag() {
        let lock = ActorLock::new();
        let handle = lock.clone();
        assert!(lock.try_engage());
        assert!(handle.is_engaged());
        handle.release();
        assert!(!lock.is_engaged());
    }

    #[test]
    fn session_delivers_status_notes() {
        let (session, rx) = ActorSession::new(ActorId::new(3));
        session.status().notify(session.id(), "undo complete (1/5)");
        let note = rx.try_recv().unwrap();
        assert_eq!(note.actor, ActorId::new(3));
        assert_eq!(note.text, "undo complete (1/5)");
    }

    #[test]
    fn notify_survives_dropped_receiver() {
        let (session, rx) = ActorSession::new(ActorId::new(4));
        drop(rx);
        session.status().notify(session.id(), "nobody listening");
    }

    #[test]
    fn detached_session_discards_notes() {
        let session = ActorSession::detached(ActorId::new(5));
        session.status().notify(session.id(), "into the void");
        assert!(!session.is_operating());
    }
}
