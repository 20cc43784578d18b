#![forbid(unsafe_code)]

//! The operation scheduler.
//!
//! One [`OperationManager`] exists per host process. It owns the pending
//! queue, drives the lifecycle of every submitted operation, and bounds
//! how much grid work happens per simulation tick so the live world never
//! stalls behind a large edit.
//!
//! ```text
//!          submit()                    tick()                 tick()..
//! actor ──► pending ──► calc workers ──► test ──► active ──► apply_step
//!              │              │            │                    │
//!              │              └─ failed ───┤                    ├─ done
//!              └────────── rejected ───────┴──► dispose ◄───────┘
//! ```
//!
//! # Threading
//!
//! `submit`, `tick`, `finish`, and `reset` must all be called from the
//! authoritative thread; hosts marshal cross-thread submissions onto it.
//! Only `calculate` runs elsewhere, on the pool owned by this manager.
//!
//! # Ordering
//!
//! The pending queue is strict FIFO across actors. Within one actor,
//! ordering needs no queue discipline at all: the actor lock rejects a
//! second submission while one operation is in flight.

use std::collections::VecDeque;
use std::sync::mpsc;

use blockwork_core::{ActorId, Grid};
use web_time::Duration;

use crate::executor::{CalcExecutor, CalcOutcome};
use crate::operation::{Operation, OperationError, Outcome, Phase};
use crate::session::{ActorLock, ActorSession};

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Combined block changes allowed per tick, across all active
    /// operations.
    pub tick_budget: usize,
    /// Pending-queue capacity; submissions beyond it are rejected.
    pub max_queue: usize,
    /// Worker threads for the calculate phase.
    pub calc_workers: usize,
    /// How long shutdown waits for in-flight calculations.
    pub shutdown_grace: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tick_budget: 10_000,
            max_queue: 64,
            calc_workers: 2,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    /// Default configuration with the given per-tick budget.
    #[must_use]
    pub fn new(tick_budget: usize) -> Self {
        Self {
            tick_budget,
            ..Self::default()
        }
    }

    /// Unbounded budget and queue (for tests).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            tick_budget: usize::MAX,
            max_queue: usize::MAX,
            ..Self::default()
        }
    }

    /// Set the pending-queue capacity.
    #[must_use]
    pub fn with_max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue;
        self
    }

    /// Set the calculate-pool size.
    #[must_use]
    pub fn with_calc_workers(mut self, calc_workers: usize) -> Self {
        self.calc_workers = calc_workers;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Submission failures. Both leave the operation unqueued and the actor
/// lock untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Another operation is already in flight for this actor.
    ActorBusy(ActorId),
    /// The pending queue is at capacity.
    QueueFull { capacity: usize },
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ActorBusy(actor) => {
                write!(f, "an operation is already in progress for {actor}")
            }
            Self::QueueFull { capacity } => {
                write!(f, "operation queue is full ({capacity})")
            }
        }
    }
}

impl std::error::Error for SubmitError {}

/// Scheduler counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    /// Operations abandoned mid-calculate at shutdown (plus panicked
    /// calculations whose value was lost).
    pub abandoned: u64,
    /// Block changes and captures performed, totalled across ticks.
    pub blocks_processed: u64,
    pub ticks: u64,
}

/// Scheduler bookkeeping around one submitted operation.
pub(crate) struct ManagedOperation {
    pub(crate) op: Box<dyn Operation>,
    pub(crate) actor: ActorId,
    pub(crate) lock: ActorLock,
    pub(crate) phase: Phase,
}

impl std::fmt::Debug for ManagedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedOperation")
            .field("actor", &self.actor)
            .field("lock", &self.lock)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// The single process-wide scheduler.
pub struct OperationManager {
    config: ManagerConfig,
    pending: VecDeque<ManagedOperation>,
    active: VecDeque<ManagedOperation>,
    /// `(actor, lock)` for every operation currently at the calc pool.
    /// Guarantees lock release even when the operation value never comes
    /// back (panic, shutdown abandonment). One entry per actor at most,
    /// courtesy of the actor lock.
    calculating: Vec<(ActorId, ActorLock)>,
    executor: CalcExecutor,
    done_rx: mpsc::Receiver<CalcOutcome>,
    stats: ManagerStats,
}

impl OperationManager {
    /// Create a manager and spawn its calculate pool.
    pub fn new(config: ManagerConfig) -> std::io::Result<Self> {
        let (done_tx, done_rx) = mpsc::channel();
        let executor =
            CalcExecutor::start(config.calc_workers, config.shutdown_grace, done_tx)?;
        Ok(Self {
            config,
            pending: VecDeque::new(),
            active: VecDeque::new(),
            calculating: Vec::new(),
            executor,
            done_rx,
            stats: ManagerStats::default(),
        })
    }

    /// Queue an operation on behalf of `session`'s actor.
    ///
    /// Engages the actor lock on success; the lock is released when the
    /// operation disposes.
    pub fn submit(
        &mut self,
        op: Box<dyn Operation>,
        session: &ActorSession,
    ) -> Result<(), SubmitError> {
        if self.pending.len() >= self.config.max_queue {
            self.stats.rejected += 1;
            return Err(SubmitError::QueueFull {
                capacity: self.config.max_queue,
            });
        }
        if !session.lock().try_engage() {
            self.stats.rejected += 1;
            return Err(SubmitError::ActorBusy(session.id()));
        }

        self.stats.submitted += 1;
        tracing::debug!(
            target: "blockwork.manager",
            actor = %session.id(),
            label = op.label(),
            queued = self.pending.len() + 1,
            "operation queued"
        );
        self.pending.push_back(ManagedOperation {
            op,
            actor: session.id(),
            lock: session.lock().clone(),
            phase: Phase::Queued,
        });
        Ok(())
    }

    /// Drive one scheduling tick. Never blocks beyond the configured
    /// per-tick write budget.
    pub fn tick(&mut self, grid: &mut dyn Grid) {
        self.stats.ticks += 1;
        self.pump_calculations(grid);
        self.dispatch_pending();
        let budget = self.config.tick_budget;
        self.apply_active(grid, budget);
    }

    /// Complete all in-flight apply work synchronously and stop the
    /// calculate pool. Used at shutdown, before [`reset`](Self::reset):
    /// partial applies are driven to completion rather than left
    /// half-written, while operations that have not written anything yet
    /// are cancelled.
    pub fn finish(&mut self, grid: &mut dyn Grid) {
        tracing::debug!(
            target: "blockwork.manager",
            pending = self.pending.len(),
            calculating = self.calculating.len(),
            active = self.active.len(),
            "finishing"
        );

        // Nothing queued has written yet; cancel rather than rush it in.
        while let Some(managed) = self.pending.pop_front() {
            self.retire(managed, Outcome::Cancelled);
        }

        self.executor.shutdown(self.config.shutdown_grace);
        self.drain_calc_results();

        // Whatever is left in the ticket table never came back from the
        // pool: release the locks so the actors are not wedged.
        for (actor, lock) in self.calculating.drain(..) {
            tracing::warn!(
                target: "blockwork.manager",
                %actor,
                "abandoning operation still calculating at shutdown"
            );
            lock.release();
            self.stats.abandoned += 1;
        }

        // Mid-apply operations run to completion, off-budget.
        while let Some(mut managed) = self.active.pop_front() {
            if managed.op.is_cancelled() {
                self.retire(managed, Outcome::Cancelled);
                continue;
            }
            loop {
                match managed.op.apply_step(grid, usize::MAX) {
                    Ok(progress) => {
                        self.stats.blocks_processed += progress.performed as u64;
                        if progress.is_done() {
                            self.retire(managed, Outcome::Completed);
                            break;
                        }
                        if managed.op.is_cancelled() || progress.performed == 0 {
                            self.retire(managed, Outcome::Cancelled);
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            target: "blockwork.manager",
                            error = %err,
                            "apply failed while finishing"
                        );
                        self.retire(managed, Outcome::Failed(err));
                        break;
                    }
                }
            }
        }
    }

    /// Clear all state and release every actor lock, returning the
    /// manager to its just-constructed emptiness. Idempotent. Anything
    /// still in flight is force-disposed as cancelled (committing
    /// whatever partial record it accumulated).
    pub fn reset(&mut self) {
        while let Some(managed) = self.pending.pop_front() {
            self.retire(managed, Outcome::Cancelled);
        }
        self.drain_calc_results();
        for (_, lock) in self.calculating.drain(..) {
            lock.release();
        }
        while let Some(managed) = self.active.pop_front() {
            self.retire(managed, Outcome::Cancelled);
        }
        self.stats = ManagerStats::default();
        tracing::debug!(target: "blockwork.manager", "reset");
    }

    /// Whether no operation is queued, calculating, or applying.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.calculating.is_empty() && self.active.is_empty()
    }

    /// Operations waiting for calculate dispatch.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Operations currently at the calculate pool.
    #[must_use]
    pub fn calculating_len(&self) -> usize {
        self.calculating.len()
    }

    /// Operations in the apply phase.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Scheduler counters.
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        self.stats
    }

    /// The configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Tick internals
    // ------------------------------------------------------------------

    /// Collect finished calculations, pre-flight them, and admit
    /// survivors to the active set.
    fn pump_calculations(&mut self, grid: &mut dyn Grid) {
        while let Ok(outcome) = self.done_rx.try_recv() {
            match outcome {
                CalcOutcome::Done {
                    mut managed,
                    result,
                } => {
                    self.clear_ticket(managed.actor);
                    if let Err(err) = result {
                        self.retire(managed, Outcome::Failed(err));
                        continue;
                    }
                    if managed.op.is_cancelled() {
                        self.retire(managed, Outcome::Cancelled);
                        continue;
                    }
                    match managed.op.test(grid) {
                        Ok(()) => {
                            managed.phase = Phase::Tested;
                            tracing::debug!(
                                target: "blockwork.manager",
                                actor = %managed.actor,
                                label = managed.op.label(),
                                "operation admitted to apply"
                            );
                            managed.phase = Phase::Applying;
                            self.active.push_back(managed);
                        }
                        Err(err) => {
                            // Pre-flight declined: no writes happened, so
                            // this is a clean cancellation.
                            tracing::warn!(
                                target: "blockwork.manager",
                                actor = %managed.actor,
                                label = managed.op.label(),
                                error = %err,
                                "pre-flight rejected operation"
                            );
                            self.retire(managed, Outcome::Cancelled);
                        }
                    }
                }
                CalcOutcome::Skipped { managed } => {
                    self.clear_ticket(managed.actor);
                    self.retire(managed, Outcome::Cancelled);
                }
                CalcOutcome::Lost { actor } => {
                    if let Some(index) =
                        self.calculating.iter().position(|(a, _)| *a == actor)
                    {
                        let (_, lock) = self.calculating.swap_remove(index);
                        lock.release();
                    }
                    self.stats.abandoned += 1;
                }
            }
        }
    }

    /// Hand every queued operation to the calculate pool.
    fn dispatch_pending(&mut self) {
        while let Some(mut managed) = self.pending.pop_front() {
            managed.phase = Phase::Calculating;
            self.calculating.push((managed.actor, managed.lock.clone()));
            if let Err(managed) = self.executor.submit(managed) {
                self.clear_ticket(managed.actor);
                self.retire(
                    managed,
                    Outcome::Failed(OperationError::Calculation(
                        "calculation pool unavailable".to_string(),
                    )),
                );
            }
        }
    }

    /// Spend up to `budget` block changes across the active set, splitting
    /// fairly so one large operation cannot starve the rest, while a lone
    /// operation still receives the whole budget.
    fn apply_active(&mut self, grid: &mut dyn Grid, budget: usize) {
        let mut budget = budget;
        while budget > 0 && !self.active.is_empty() {
            let share = (budget / self.active.len()).max(1);
            let mut progressed = false;

            let mut round = std::mem::take(&mut self.active);
            while let Some(mut managed) = round.pop_front() {
                if budget == 0 {
                    self.active.push_back(managed);
                    continue;
                }
                if managed.op.is_cancelled() {
                    self.retire(managed, Outcome::Cancelled);
                    continue;
                }

                let grant = share.min(budget);
                match managed.op.apply_step(grid, grant) {
                    Ok(progress) => {
                        budget = budget.saturating_sub(progress.performed);
                        self.stats.blocks_processed += progress.performed as u64;
                        if progress.performed > 0 {
                            progressed = true;
                        }
                        if progress.is_done() {
                            self.retire(managed, Outcome::Completed);
                        } else if managed.op.is_cancelled() {
                            self.retire(managed, Outcome::Cancelled);
                        } else {
                            self.active.push_back(managed);
                        }
                    }
                    Err(err) => {
                        tracing::error!(
                            target: "blockwork.manager",
                            actor = %managed.actor,
                            label = managed.op.label(),
                            error = %err,
                            "apply step failed"
                        );
                        self.retire(managed, Outcome::Failed(err));
                    }
                }
            }

            // An operation reporting work-left but performing none would
            // spin the loop forever; bail and let the next tick retry.
            if !progressed {
                break;
            }
        }
    }

    /// Terminal path shared by every exit: dispose once, then release the
    /// actor lock.
    fn retire(&mut self, mut managed: ManagedOperation, outcome: Outcome) {
        managed.phase = match &outcome {
            Outcome::Completed => {
                self.stats.completed += 1;
                Phase::Completed
            }
            Outcome::Cancelled => {
                self.stats.cancelled += 1;
                Phase::Cancelled
            }
            Outcome::Failed(_) => {
                self.stats.failed += 1;
                Phase::Failed
            }
        };
        tracing::debug!(
            target: "blockwork.manager",
            actor = %managed.actor,
            label = managed.op.label(),
            phase = %managed.phase,
            "operation retired"
        );
        managed.op.dispose(outcome);
        managed.lock.release();
    }

    fn clear_ticket(&mut self, actor: ActorId) {
        self.calculating.retain(|(a, _)| *a != actor);
    }

    /// Drain the results channel during shutdown, cancelling everything:
    /// none of these operations has written anything yet.
    fn drain_calc_results(&mut self) {
        while let Ok(result) = self.done_rx.try_recv() {
            match result {
                CalcOutcome::Done { managed, .. } | CalcOutcome::Skipped { managed } => {
                    self.clear_ticket(managed.actor);
                    self.retire(managed, Outcome::Cancelled);
                }
                CalcOutcome::Lost { actor } => {
                    if let Some(index) =
                        self.calculating.iter().position(|(a, _)| *a == actor)
                    {
                        let (_, lock) = self.calculating.swap_remove(index);
                        lock.release();
                    }
                    self.stats.abandoned += 1;
                }
            }
        }
    }
}
