//! Condition variables paired with [`KMutex`].
//!
//! Waiting requires the caller to hold the mutex. The wait releases it, and
//! every return path re-establishes ownership before handing control back.
//! Spurious wakeups are possible; callers re-check their predicate in a loop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, PoisonError};
use std::time::Instant;

use crate::clock;
use crate::curthread;
use crate::mutex::{KMutex, MutexState};

const UNINITIALIZED: u8 = 0;
const ACTIVE: u8 = 1;
const DESTROYED: u8 = 2;

/// Outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedWait {
    /// Woken before the deadline (signal, broadcast or spurious).
    Woken,
    /// The deadline passed.
    TimedOut,
}

/// Kernel-style condition variable.
#[derive(Debug)]
pub struct KCondvar {
    cv: Condvar,
    state: AtomicU8,
}

impl KCondvar {
    /// Creates an initialized condition variable.
    pub const fn new() -> Self {
        Self {
            cv: Condvar::new(),
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// Creates a condition variable that must be [`init`](Self::init)ed.
    pub const fn uninit() -> Self {
        Self {
            cv: Condvar::new(),
            state: AtomicU8::new(UNINITIALIZED),
        }
    }

    pub fn init(&self) {
        let prev = self
            .state
            .compare_exchange(UNINITIALIZED, ACTIVE, Ordering::AcqRel, Ordering::Acquire);
        assert!(prev.is_ok(), "cv_init: condvar already initialized");
    }

    pub fn destroy(&self) {
        let prev = self
            .state
            .compare_exchange(ACTIVE, DESTROYED, Ordering::AcqRel, Ordering::Acquire);
        assert!(prev.is_ok(), "cv_destroy: condvar is {}", state_name(self.state()));
    }

    /// Releases `mp`, waits for a wakeup, and re-acquires `mp`.
    pub fn wait(&self, mp: &KMutex) {
        let me = curthread();
        let mut state = mp.lock_state();
        self.assert_active("cv_wait");
        mp.release_for_wait(&mut state, me, "cv_wait");
        let state = self.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        drop(mp.acquire(state, me, "cv_wait"));
    }

    /// Like [`wait`](Self::wait), but gives up at `deadline`.
    ///
    /// A deadline already in the past returns [`TimedWait::TimedOut`] without
    /// releasing the mutex.
    pub fn timed_wait(&self, mp: &KMutex, deadline: Instant) -> TimedWait {
        let me = curthread();
        let mut state = mp.lock_state();
        self.assert_active("cv_timedwait");
        assert!(
            *state == MutexState::Held(me),
            "cv_timedwait: {me:?} does not own mutex ({:?})",
            *state
        );

        let now = Instant::now();
        if deadline <= now {
            return TimedWait::TimedOut;
        }

        mp.release_for_wait(&mut state, me, "cv_timedwait");
        let (state, result) = self
            .cv
            .wait_timeout(state, deadline - now)
            .unwrap_or_else(PoisonError::into_inner);
        drop(mp.acquire(state, me, "cv_timedwait"));

        if result.timed_out() {
            TimedWait::TimedOut
        } else {
            TimedWait::Woken
        }
    }

    /// Timed wait with an absolute deadline in clock ticks.
    ///
    /// Returns -1 on timeout and 1 otherwise.
    pub fn timed_wait_ticks(&self, mp: &KMutex, abstime: i64) -> i64 {
        let outcome = match clock::deadline_from_ticks(abstime) {
            Some(deadline) => self.timed_wait(mp, deadline),
            None => {
                assert!(mp.held(), "cv_timedwait: caller does not own mutex");
                TimedWait::TimedOut
            }
        };
        match outcome {
            TimedWait::Woken => 1,
            TimedWait::TimedOut => -1,
        }
    }

    /// Wakes one waiter.
    pub fn signal(&self) {
        self.assert_active("cv_signal");
        self.cv.notify_one();
    }

    /// Wakes every waiter.
    pub fn broadcast(&self) {
        self.assert_active("cv_broadcast");
        self.cv.notify_all();
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn assert_active(&self, op: &str) {
        let state = self.state();
        assert!(state == ACTIVE, "{op}: condvar is {}", state_name(state));
    }
}

impl Default for KCondvar {
    fn default() -> Self {
        Self::new()
    }
}

fn state_name(state: u8) -> &'static str {
    match state {
        UNINITIALIZED => "Uninitialized",
        ACTIVE => "Active",
        _ => "Destroyed",
    }
}
