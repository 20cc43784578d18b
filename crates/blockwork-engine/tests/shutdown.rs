//! Shutdown lifecycle: `finish` completes partial applies and abandons
//! unfinished calculations, `reset` leaves the manager pristine, and no
//! path leaves an actor lock engaged.

use std::thread;
use std::time::Duration;

use blockwork_core::{ActorId, BlockState, Grid, MemoryGrid, Position, Region};
use blockwork_engine::{
    ActorSession, ManagerConfig, Operation, OperationError, OperationManager, Outcome,
    PlaceOperation, Placement, Progress, SharedHistory,
};

fn grid() -> MemoryGrid {
    MemoryGrid::new(Region::new(
        Position::new(-64, -64, -64),
        Position::new(64, 64, 64),
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

fn tick_until(
    manager: &mut OperationManager,
    grid: &mut MemoryGrid,
    mut pred: impl FnMut(&OperationManager, &MemoryGrid) -> bool,
) {
    for _ in 0..10_000 {
        manager.tick(grid);
        if pred(manager, grid) {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("condition never became true");
}

#[test]
fn finish_completes_partial_applies() {
    let mut manager = OperationManager::new(ManagerConfig::new(5)).unwrap();
    let mut g = grid();
    let session = ActorSession::detached(ActorId::new(1));
    let history = SharedHistory::new(4);

    let op = PlaceOperation::from_placements(row(50, 3), history.clone(), session.id());
    manager.submit(Box::new(op), &session).unwrap();

    // Stop mid-apply: some writes done, most outstanding.
    tick_until(&mut manager, &mut g, |_, g| g.writes() >= 10);
    assert!(g.writes() < 50);

    manager.finish(&mut g);
    assert_eq!(g.writes(), 50);
    assert!(manager.is_idle());
    assert!(!session.is_operating());
    assert_eq!(history.size(), 1);
    assert_eq!(history.pop_newest().unwrap().len(), 50);
}

#[test]
fn finish_cancels_work_that_never_wrote() {
    let mut manager = OperationManager::new(ManagerConfig::unlimited()).unwrap();
    let mut g = grid();
    let session = ActorSession::detached(ActorId::new(2));
    let history = SharedHistory::new(4);

    // Submitted but never ticked: still queued when shutdown begins.
    let op = PlaceOperation::from_placements(row(10, 1), history.clone(), session.id());
    manager.submit(Box::new(op), &session).unwrap();

    manager.finish(&mut g);
    assert_eq!(g.writes(), 0);
    assert_eq!(history.size(), 0);
    assert!(!session.is_operating());
    assert!(manager.is_idle());
}

struct SlowCalcOperation {
    delay: Duration,
}

impl Operation for SlowCalcOperation {
    fn label(&self) -> &str {
        "slow"
    }

    fn is_cancelled(&self) -> bool {
        false
    }

    fn calculate(&mut self) -> Result<(), OperationError> {
        thread::sleep(self.delay);
        Ok(())
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

#[test]
fn overrunning_calculation_is_abandoned_with_lock_released() {
    let config = ManagerConfig::unlimited()
        .with_shutdown_grace(web_time::Duration::from_millis(50));
    let mut manager = OperationManager::new(config).unwrap();
    let mut g = grid();
    let session = ActorSession::detached(ActorId::new(3));

    let op = SlowCalcOperation {
        delay: Duration::from_millis(800),
    };
    manager.submit(Box::new(op), &session).unwrap();

    // One tick dispatches the job; give a worker time to pick it up.
    manager.tick(&mut g);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(manager.calculating_len(), 1);

    manager.finish(&mut g);
    assert!(manager.is_idle());
    assert!(!session.is_operating());
    assert_eq!(manager.stats().abandoned, 1);
    assert_eq!(g.writes(), 0);
}

#[test]
fn reset_after_finish_restores_constructed_state() {
    let mut manager = OperationManager::new(ManagerConfig::new(5)).unwrap();
    let mut g = grid();
    let session = ActorSession::detached(ActorId::new(4));
    let history = SharedHistory::new(4);

    let op = PlaceOperation::from_placements(row(20, 2), history.clone(), session.id());
    manager.submit(Box::new(op), &session).unwrap();
    tick_until(&mut manager, &mut g, |_, g| g.writes() >= 5);

    manager.finish(&mut g);
    manager.reset();

    assert!(manager.is_idle());
    assert_eq!(manager.pending_len(), 0);
    assert_eq!(manager.calculating_len(), 0);
    assert_eq!(manager.active_len(), 0);
    assert_eq!(manager.stats(), Default::default());

    // Idempotent: a second reset changes nothing.
    manager.reset();
    assert!(manager.is_idle());
    assert_eq!(manager.stats(), Default::default());
}

#[test]
fn reset_alone_force_disposes_and_keeps_partial_records() {
    let mut manager = OperationManager::new(ManagerConfig::new(7)).unwrap();
    let mut g = grid();
    let session = ActorSession::detached(ActorId::new(5));
    let history = SharedHistory::new(4);

    let op = PlaceOperation::from_placements(row(30, 9), history.clone(), session.id());
    manager.submit(Box::new(op), &session).unwrap();
    tick_until(&mut manager, &mut g, |_, g| g.writes() >= 7);
    let written = g.writes();

    manager.reset();
    assert!(manager.is_idle());
    assert!(!session.is_operating());
    // The partial apply stays undoable.
    assert_eq!(history.size(), 1);
    assert_eq!(history.pop_newest().unwrap().len() as u64, written);
}
