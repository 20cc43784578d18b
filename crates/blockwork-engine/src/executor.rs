#![forbid(unsafe_code)]

//! Worker pool for the calculate phase.
//!
//! Calculation is the only phase that runs off the authoritative thread.
//! Jobs are handed to a small pool of named workers over a shared channel;
//! finished jobs come back to the scheduler on the results channel it owns.
//!
//! # Shutdown
//!
//! `shutdown(grace)` cancels the pool token and closes the job channel,
//! then waits for worker exit acknowledgements up to the grace deadline.
//! Workers drain still-queued jobs without running them (the scheduler
//! cancels those on return); a worker stuck inside a long `calculate` past
//! the deadline is detached and its operation is abandoned — safe, because
//! calculation never touches the grid. The scheduler releases abandoned
//! actors' locks from its own bookkeeping.
//!
//! # Panics
//!
//! A panic inside `calculate` is caught on the worker; the operation value
//! is lost to the unwind, so the pool reports [`CalcOutcome::Lost`] with
//! the actor id and the scheduler cleans up from that.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use blockwork_core::ActorId;
use web_time::{Duration, Instant};

use crate::cancellation::{CancellationSource, CancellationToken};
use crate::manager::ManagedOperation;
use crate::operation::OperationError;

/// Result of one calculate job, delivered to the scheduler.
pub(crate) enum CalcOutcome {
    /// `calculate()` ran to completion (successfully or not).
    Done {
        managed: ManagedOperation,
        result: Result<(), OperationError>,
    },
    /// The job was still queued when shutdown began; it never ran.
    Skipped { managed: ManagedOperation },
    /// The job panicked and its operation was lost to the unwind.
    Lost { actor: ActorId },
}

pub(crate) struct CalcExecutor {
    job_tx: Option<mpsc::Sender<ManagedOperation>>,
    ack_rx: mpsc::Receiver<()>,
    cancel: CancellationSource,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
    shut_down: bool,
}

impl CalcExecutor {
    /// Spawn `worker_count` workers (at least one) sending results to
    /// `done_tx`.
    pub(crate) fn start(
        worker_count: usize,
        grace: Duration,
        done_tx: mpsc::Sender<CalcOutcome>,
    ) -> std::io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<ManagedOperation>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (ack_tx, ack_rx) = mpsc::channel();
        let cancel = CancellationSource::new();

        let count = worker_count.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let jobs = Arc::clone(&job_rx);
            let done = done_tx.clone();
            let ack = ack_tx.clone();
            let token = cancel.token();
            let handle = thread::Builder::new()
                .name(format!("blockwork-calc-{index}"))
                .spawn(move || {
                    worker_loop(index, &jobs, &done, &token);
                    let _ = ack.send(());
                })?;
            workers.push(handle);
        }

        Ok(Self {
            job_tx: Some(job_tx),
            ack_rx,
            cancel,
            workers,
            grace,
            shut_down: false,
        })
    }

    /// Hand a job to the pool. Returns the job when the pool is already
    /// shut down.
    pub(crate) fn submit(&self, managed: ManagedOperation) -> Result<(), ManagedOperation> {
        match &self.job_tx {
            Some(tx) => tx.send(managed).map_err(|rejected| rejected.0),
            None => Err(managed),
        }
    }

    /// Stop the pool, waiting up to `grace` for workers to drain.
    pub(crate) fn shutdown(&mut self, grace: Duration) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.cancel.cancel();
        // Closing the channel wakes idle workers out of recv.
        self.job_tx = None;

        let deadline = Instant::now() + grace;
        let mut acked = 0;
        while acked < self.workers.len() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.ack_rx.recv_timeout(deadline - now) {
                Ok(()) => acked += 1,
                Err(_) => break,
            }
        }

        if acked == self.workers.len() {
            for handle in self.workers.drain(..) {
                let _ = handle.join();
            }
            tracing::debug!(target: "blockwork.executor", "calculation pool stopped");
        } else {
            let detached = self.workers.len() - acked;
            // Joining would block past the grace period; let them go.
            self.workers.clear();
            tracing::warn!(
                target: "blockwork.executor",
                detached,
                "calculation workers overran shutdown grace; detaching"
            );
        }
    }
}

impl Drop for CalcExecutor {
    fn drop(&mut self) {
        self.shutdown(self.grace);
    }
}

fn worker_loop(
    index: usize,
    jobs: &Mutex<mpsc::Receiver<ManagedOperation>>,
    done: &mpsc::Sender<CalcOutcome>,
    token: &CancellationToken,
) {
    tracing::debug!(target: "blockwork.executor", worker = index, "calculation worker started");
    loop {
        // Hold the queue lock only while receiving; it is free while the
        // job runs so siblings can pull work.
        let next = {
            let guard = jobs.lock().unwrap_or_else(|e| e.into_inner());
            guard.recv()
        };
        let Ok(managed) = next else {
            break;
        };

        if token.is_cancelled() {
            if done.send(CalcOutcome::Skipped { managed }).is_err() {
                break;
            }
            continue;
        }

        let actor = managed.actor;
        let label = managed.op.label().to_string();
        let outcome = catch_unwind(AssertUnwindSafe(move || {
            let mut managed = managed;
            let result = managed.op.calculate();
            (managed, result)
        }));

        let message = match outcome {
            Ok((managed, result)) => {
                if let Err(err) = &result {
                    tracing::debug!(
                        target: "blockwork.executor",
                        worker = index,
                        %actor,
                        label = %label,
                        error = %err,
                        "calculation failed"
                    );
                }
                CalcOutcome::Done { managed, result }
            }
            Err(payload) => {
                tracing::error!(
                    target: "blockwork.executor",
                    worker = index,
                    %actor,
                    label = %label,
                    panic = panic_message(payload.as_ref()),
                    "calculation panicked; operation lost"
                );
                CalcOutcome::Lost { actor }
            }
        };

        if done.send(message).is_err() {
            break;
        }
    }
    tracing::debug!(target: "blockwork.executor", worker = index, "calculation worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::SharedHistory;
    use crate::manager::ManagedOperation;
    use crate::operation::{Operation, Outcome, Phase, Progress};
    use crate::operations::PlaceOperation;
    use crate::session::ActorLock;
    use blockwork_core::Grid;

    struct PanickingOperation;

    impl Operation for PanickingOperation {
        fn is_cancelled(&self) -> bool {
            false
        }
        fn calculate(&mut self) -> Result<(), OperationError> {
            panic!("boom");
        }
        fn apply_step(
            &mut self,
            _grid: &mut dyn Grid,
            _budget: usize,
        ) -> Result<Progress, OperationError> {
            Ok(Progress::done(0))
        }
        fn dispose(&mut self, _outcome: Outcome) {}
    }

    fn managed(op: Box<dyn Operation>) -> ManagedOperation {
        ManagedOperation {
            op,
            actor: ActorId::new(1),
            lock: ActorLock::new(),
            phase: Phase::Calculating,
        }
    }

    fn place_op() -> Box<dyn Operation> {
        Box::new(PlaceOperation::from_placements(
            Vec::new(),
            SharedHistory::new(1),
            ActorId::new(1),
        ))
    }

    #[test]
    fn jobs_come_back_done() {
        let (done_tx, done_rx) = mpsc::channel();
        let mut pool = CalcExecutor::start(2, Duration::from_secs(1), done_tx).unwrap();

        pool.submit(managed(place_op())).unwrap();
        let outcome = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            outcome,
            CalcOutcome::Done { result: Ok(()), .. }
        ));
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn panicking_job_reports_lost_actor() {
        let (done_tx, done_rx) = mpsc::channel();
        let mut pool = CalcExecutor::start(1, Duration::from_secs(1), done_tx).unwrap();

        pool.submit(managed(Box::new(PanickingOperation))).unwrap();
        let outcome = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            outcome,
            CalcOutcome::Lost { actor } if actor == ActorId::new(1)
        ));

        // The worker survives the panic and keeps serving jobs.
        pool.submit(managed(place_op())).unwrap();
        let outcome = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, CalcOutcome::Done { .. }));
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn submit_after_shutdown_returns_the_job() {
        let (done_tx, _done_rx) = mpsc::channel();
        let mut pool = CalcExecutor::start(1, Duration::from_secs(1), done_tx).unwrap();
        pool.shutdown(Duration::from_secs(1));
        assert!(pool.submit(managed(place_op())).is_err());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (done_tx, _done_rx) = mpsc::channel();
        let mut pool = CalcExecutor::start(2, Duration::from_secs(1), done_tx).unwrap();
        pool.shutdown(Duration::from_secs(1));
        pool.shutdown(Duration::from_secs(1));
    }
}
