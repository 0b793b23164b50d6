//! Fixed-timestep scheduling.
//!
//! [`FixedStepClock`] turns wall-clock time into a count of due ticks. The
//! scheduler thread owns nothing: it borrows the shared state, runs due
//! ticks under the coarse update lock and wakes any tick waiters.
//!
//! Lock order is always the simulation lock first, then the pending lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::{PendingAction, Simulation};

/// Accumulates elapsed real time and releases it one tick at a time.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    step: Duration,
    accumulated: Duration,
    previous: Instant,
}

impl FixedStepClock {
    pub fn new(step: Duration, now: Instant) -> Self {
        Self {
            step,
            accumulated: Duration::ZERO,
            previous: now,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn accumulate(&mut self, now: Instant) {
        self.accumulated += now.saturating_duration_since(self.previous);
        self.previous = now;
    }

    /// Take one tick's worth of accumulated time if available.
    pub fn consume_tick(&mut self) -> bool {
        if self.step.is_zero() || self.accumulated < self.step {
            return false;
        }
        self.accumulated -= self.step;
        true
    }

    /// Accumulate up to `now` and consume every due tick.
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.accumulate(now);
        let mut due = 0;
        while self.consume_tick() {
            due += 1;
        }
        due
    }

    /// Drop time elapsed since the last call, so a pause leaves no backlog.
    pub fn freeze(&mut self, now: Instant) {
        self.previous = now;
    }

    /// Progress into the next tick, for interpolated rendering.
    pub fn time_since_tick(&self) -> Duration {
        self.accumulated
    }
}

pub(crate) struct SimState {
    pub(crate) simulation: Simulation,
    pub(crate) clock: FixedStepClock,
}

pub(crate) struct Shared {
    /// Coarse update lock around all simulation state.
    pub(crate) state: Mutex<SimState>,
    /// Narrow lock around externally submitted actions.
    pub(crate) pending: Mutex<Vec<PendingAction>>,
    /// Signalled after every tick, paired with `state`.
    pub(crate) ticked: Condvar,
    pub(crate) paused: AtomicBool,
    pub(crate) running: AtomicBool,
}

impl Shared {
    pub(crate) fn new(simulation: Simulation) -> Self {
        let step = simulation.config().tick_duration();
        Self {
            state: Mutex::new(SimState {
                simulation,
                clock: FixedStepClock::new(step, Instant::now()),
            }),
            pending: Mutex::new(Vec::new()),
            ticked: Condvar::new(),
            paused: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }
}

/// A panic mid-tick leaves state that the next tick overwrites, so poisoned
/// locks are taken over rather than propagated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run one tick with the coarse lock already held.
pub(crate) fn run_tick(shared: &Shared, state: &mut SimState) {
    let pending = std::mem::take(&mut *lock(&shared.pending));
    state.simulation.tick(pending);
    shared.ticked.notify_all();
}

pub(crate) fn spawn(shared: Arc<Shared>, sleep: Duration) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("station-scheduler".into())
        .spawn(move || run(&shared, sleep))
}

fn run(shared: &Shared, sleep: Duration) {
    log::info!("scheduler started");
    lock(&shared.state).clock.freeze(Instant::now());

    while shared.running.load(Ordering::SeqCst) {
        if shared.paused.load(Ordering::SeqCst) {
            lock(&shared.state).clock.freeze(Instant::now());
        } else {
            lock(&shared.state).clock.accumulate(Instant::now());
            loop {
                let mut state = lock(&shared.state);
                if !state.clock.consume_tick() {
                    break;
                }
                run_tick(shared, &mut state);
            }
        }
        thread::sleep(sleep);
    }
    log::info!("scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(50);

    #[test]
    fn test_advance_counts_due_ticks() {
        let t0 = Instant::now();
        let mut clock = FixedStepClock::new(STEP, t0);
        assert_eq!(clock.advance(t0 + Duration::from_millis(120)), 2);
        assert_eq!(clock.time_since_tick(), Duration::from_millis(20));
        assert_eq!(clock.advance(t0 + Duration::from_millis(150)), 1);
        assert_eq!(clock.time_since_tick(), Duration::ZERO);
    }

    #[test]
    fn test_freeze_discards_paused_time() {
        let t0 = Instant::now();
        let mut clock = FixedStepClock::new(STEP, t0);
        clock.advance(t0 + Duration::from_millis(30));
        clock.freeze(t0 + Duration::from_secs(10));
        assert_eq!(clock.advance(t0 + Duration::from_millis(10_040)), 1);
        assert_eq!(clock.time_since_tick(), Duration::from_millis(20));
    }

    #[test]
    fn test_time_going_backwards_is_ignored() {
        let t0 = Instant::now() + Duration::from_secs(1);
        let mut clock = FixedStepClock::new(STEP, t0);
        assert_eq!(clock.advance(t0 - Duration::from_millis(500)), 0);
        assert_eq!(clock.time_since_tick(), Duration::ZERO);
    }

    #[test]
    fn test_consume_tick_one_at_a_time() {
        let t0 = Instant::now();
        let mut clock = FixedStepClock::new(STEP, t0);
        clock.accumulate(t0 + Duration::from_millis(100));
        assert!(clock.consume_tick());
        assert!(clock.consume_tick());
        assert!(!clock.consume_tick());
    }
}
