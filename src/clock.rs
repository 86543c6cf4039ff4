//! The global virtual clock, timer index, and dual transmission queues.
//!
//! This is a from-scratch replacement for the teacher's wall-clock
//! `time_driver.rs`: that driver scales real elapsed time into virtual time,
//! which has no place here since this simulator has no wall-clock notion at
//! all (ticks advance only when the scheduler says so). What is kept is the
//! shape of a single global driver behind a lock, addressed through a handle
//! rather than a bare static, the same way the teacher addresses its clock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::control::Slot;
use crate::payload::Frame;

/// One frame in flight across the medium, tracked tick by tick.
pub struct TransmissionRecord {
    pub sources: Vec<u64>,
    /// Destination node id paired with the power it receives this frame at.
    pub destinations: Vec<(u64, f64)>,
    pub total_ticks: u64,
    pub remaining_ticks: u64,
    pub frame: Frame,
}

impl TransmissionRecord {
    pub fn is_starting(&self) -> bool {
        self.remaining_ticks == self.total_ticks
    }

    pub fn is_expiring(&self) -> bool {
        self.remaining_ticks == 0
    }
}

/// A registered wake for a specific tick; fired at most once.
struct TimerEntry {
    id: u64,
    waiter: &'static Slot<()>,
}

#[derive(Default)]
struct ClockState {
    tick: u64,
    now: Vec<TransmissionRecord>,
    next: Vec<TransmissionRecord>,
    timers: BTreeMap<u64, Vec<TimerEntry>>,
    next_timer_id: u64,
}

/// A handle identifying one registered timer, used to cancel it early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId {
    expiry: u64,
    id: u64,
}

/// The scheduler's shared mutable state.
///
/// Exactly one cooperative task ever touches this at a time (the executor
/// has no preemption), so a plain `std::sync::Mutex` is enough; nothing here
/// is ever contended.
pub struct Clock {
    state: Mutex<ClockState>,
    /// Set once by the scheduler after `run_ticks`'s loop returns. Nothing
    /// polls this to interrupt an in-progress wait (a suspended `.await`
    /// cannot be unstuck by a flag alone); it exists so any task can ask
    /// "has the run already ended" at a point where it is about to decide
    /// whether to keep going, separately from the actual per-task
    /// cancellation delivered by the scheduler (§4.1, `Node::request_terminate`).
    terminated: AtomicBool,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState::default()),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn now(&self) -> u64 {
        self.state.lock().unwrap().tick
    }

    /// Mark the run as finished. Idempotent.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Push a freshly started transmission into the queue that will be
    /// drained on the *next* tick, matching the original's two-tick-minimum
    /// delivery latency.
    pub fn enqueue_transmission(&self, record: TransmissionRecord) {
        self.state.lock().unwrap().next.push(record);
    }

    /// Register a wake for `waiter` at absolute tick `expiry`.
    pub fn register_timer(&self, expiry: u64, waiter: &'static Slot<()>) -> TimerId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_timer_id;
        state.next_timer_id += 1;
        state.timers.entry(expiry).or_default().push(TimerEntry { id, waiter });
        TimerId { expiry, id }
    }

    /// Remove a timer before it fires. A no-op if it already fired.
    pub fn cancel_timer(&self, timer: TimerId) {
        let mut state = self.state.lock().unwrap();
        if let Some(entries) = state.timers.get_mut(&timer.expiry) {
            entries.retain(|e| e.id != timer.id);
            if entries.is_empty() {
                state.timers.remove(&timer.expiry);
            }
        }
    }

    /// Run one full tick: drain `now`, fire due timers, swap, advance.
    ///
    /// Returns the start/stop fan-out work the caller (the scheduler) must
    /// perform by delivering radio events to each destination; this type
    /// itself has no notion of a node or a radio, only of transmissions and
    /// timers, matching how the original's driver loop is agnostic of what a
    /// `PDSNS_RADIO_START_RECEIVING` event actually does once accepted.
    pub fn begin_tick(&self) -> TickWork {
        let mut state = self.state.lock().unwrap();
        let draining = std::mem::take(&mut state.now);
        let tick = state.tick;

        let mut starting = Vec::new();
        let mut expiring = Vec::new();
        for mut record in draining {
            if record.is_starting() {
                starting.push(Start {
                    destinations: record.destinations.clone(),
                    frame: record.frame.clone(),
                });
                record.remaining_ticks -= 1;
                state.next.push(record);
            } else if record.is_expiring() {
                expiring.push(Stop {
                    sources: record.sources.clone(),
                    destinations: record.destinations.clone(),
                });
            } else {
                record.remaining_ticks -= 1;
                state.next.push(record);
            }
        }

        let due = state.timers.remove(&tick).unwrap_or_default();

        TickWork {
            tick,
            starting,
            expiring,
            due_waiters: due.into_iter().map(|e| e.waiter).collect(),
        }
    }

    /// Swap the dual queues and advance the clock. Called once all of a
    /// tick's fan-out and timer wakes have run to quiescence.
    pub fn end_tick(&self) {
        let mut state = self.state.lock().unwrap();
        state.now = std::mem::take(&mut state.next);
        state.tick += 1;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A transmission entering its first tick at one destination.
pub struct Start {
    pub destinations: Vec<(u64, f64)>,
    pub frame: Frame,
}

/// A transmission completing: the destinations whose reception is ending,
/// and the sources whose radio can now report the send's outcome.
pub struct Stop {
    pub sources: Vec<u64>,
    pub destinations: Vec<(u64, f64)>,
}

/// The work the scheduler must perform for one tick, computed by `begin_tick`.
pub struct TickWork {
    pub tick: u64,
    pub starting: Vec<Start>,
    pub expiring: Vec<Stop>,
    pub due_waiters: Vec<&'static Slot<()>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_clock_starts_at_zero() {
        let clock = Clock::new();
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn end_tick_advances_by_exactly_one() {
        let clock = Clock::new();
        for expected in 1..=5u64 {
            let _ = clock.begin_tick();
            clock.end_tick();
            assert_eq!(clock.now(), expected);
        }
    }

    #[test]
    fn a_two_tick_transmission_starts_then_expires() {
        let clock = Clock::new();
        clock.enqueue_transmission(TransmissionRecord {
            sources: vec![0],
            destinations: vec![(1, 1.0)],
            total_ticks: 1,
            remaining_ticks: 1,
            frame: Frame::new(vec![1, 2, 3]),
        });
        // tick 0: nothing in `now` yet (record landed in `next`).
        let work0 = clock.begin_tick();
        assert!(work0.starting.is_empty());
        clock.end_tick();

        // tick 1: record moved into `now`; this is its starting tick.
        let work1 = clock.begin_tick();
        assert_eq!(work1.starting.len(), 1);
        clock.end_tick();

        // tick 2: remaining_ticks reached 0; this is its expiring tick.
        let work2 = clock.begin_tick();
        assert_eq!(work2.expiring.len(), 1);
    }

    #[test]
    fn cancelling_a_timer_prevents_its_wake() {
        let clock = Clock::new();
        let slot: &'static Slot<()> = Box::leak(Box::new(embassy_sync::signal::Signal::new()));
        let id = clock.register_timer(3, slot);
        clock.cancel_timer(id);
        for _ in 0..4 {
            let work = clock.begin_tick();
            assert!(work.due_waiters.is_empty());
            clock.end_tick();
        }
    }

    #[test]
    fn a_fresh_clock_is_not_terminated_until_told() {
        let clock = Clock::new();
        assert!(!clock.is_terminated());
        clock.terminate();
        assert!(clock.is_terminated());
    }

    #[test]
    fn a_timer_fires_exactly_once_at_its_expiry() {
        let clock = Clock::new();
        let slot: &'static Slot<()> = Box::leak(Box::new(embassy_sync::signal::Signal::new()));
        clock.register_timer(3, slot);
        let mut fires = 0;
        for _ in 0..6 {
            let work = clock.begin_tick();
            fires += work.due_waiters.len();
            clock.end_tick();
        }
        assert_eq!(fires, 1);
    }
}
