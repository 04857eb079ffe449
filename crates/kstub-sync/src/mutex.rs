//! Kernel mutex with owner tracking.
//!
//! Unlike `std::sync::Mutex`, a [`KMutex`] is entered and exited explicitly
//! and remembers which thread holds it. The bookkeeping turns the usual
//! kernel programming errors into assertion failures:
//!
//! - entering a mutex the caller already holds (mutexes are not recursive)
//! - exiting a mutex held by another thread, or by nobody
//! - destroying a held mutex
//! - any use before `init` or after `destroy`

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

use crate::curthread;

/// Lifecycle of a [`KMutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MutexState {
    Uninitialized,
    Unlocked,
    Held(ThreadId),
    Destroyed,
}

/// A non-recursive mutex with explicit enter/exit and owner tracking.
#[derive(Debug)]
pub struct KMutex {
    state: Mutex<MutexState>,
    released: Condvar,
}

impl KMutex {
    /// Creates an initialized, unlocked mutex.
    pub const fn new() -> Self {
        Self::with_state(MutexState::Unlocked)
    }

    /// Creates a mutex that must be [`init`](Self::init)ed before use.
    pub const fn uninit() -> Self {
        Self::with_state(MutexState::Uninitialized)
    }

    const fn with_state(state: MutexState) -> Self {
        Self {
            state: Mutex::new(state),
            released: Condvar::new(),
        }
    }

    /// Initializes a mutex created with [`uninit`](Self::uninit).
    pub fn init(&self) {
        let mut state = self.lock_state();
        assert!(
            *state == MutexState::Uninitialized,
            "mutex_init: mutex already initialized ({:?})",
            *state
        );
        *state = MutexState::Unlocked;
    }

    /// Destroys the mutex. It must not be held.
    pub fn destroy(&self) {
        let mut state = self.lock_state();
        assert!(
            *state == MutexState::Unlocked,
            "mutex_destroy: mutex is {:?}",
            *state
        );
        *state = MutexState::Destroyed;
    }

    /// Acquires the mutex, blocking while another thread holds it.
    pub fn enter(&self) {
        let me = curthread();
        let state = self.lock_state();
        drop(self.acquire(state, me, "mutex_enter"));
    }

    /// Acquires the mutex if it is free. Returns whether it was acquired.
    pub fn try_enter(&self) -> bool {
        let me = curthread();
        let mut state = self.lock_state();
        match *state {
            MutexState::Unlocked => {
                *state = MutexState::Held(me);
                true
            }
            MutexState::Held(_) => false,
            other => panic!("mutex_tryenter: mutex is {other:?}"),
        }
    }

    /// Releases the mutex. The caller must hold it.
    pub fn exit(&self) {
        let me = curthread();
        let mut state = self.lock_state();
        assert!(
            *state == MutexState::Held(me),
            "mutex_exit: {me:?} does not own mutex ({:?})",
            *state
        );
        *state = MutexState::Unlocked;
        drop(state);
        self.released.notify_one();
    }

    /// Thread holding the mutex, if any.
    pub fn owner(&self) -> Option<ThreadId> {
        match *self.lock_state() {
            MutexState::Held(owner) => Some(owner),
            MutexState::Unlocked => None,
            other => panic!("mutex_owner: mutex is {other:?}"),
        }
    }

    /// Returns true if the calling thread holds the mutex.
    pub fn held(&self) -> bool {
        self.owner() == Some(curthread())
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, MutexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gives up ownership while keeping the state lock, for condvar waits.
    pub(crate) fn release_for_wait(&self, state: &mut MutexGuard<'_, MutexState>, me: ThreadId, op: &str) {
        assert!(
            **state == MutexState::Held(me),
            "{op}: {me:?} does not own mutex ({:?})",
            **state
        );
        **state = MutexState::Unlocked;
        self.released.notify_one();
    }

    /// Blocks on the state lock until the mutex is free, then takes it for `me`.
    pub(crate) fn acquire<'a>(
        &'a self,
        mut state: MutexGuard<'a, MutexState>,
        me: ThreadId,
        op: &str,
    ) -> MutexGuard<'a, MutexState> {
        loop {
            match *state {
                MutexState::Unlocked => {
                    *state = MutexState::Held(me);
                    return state;
                }
                MutexState::Held(owner) => {
                    assert!(owner != me, "{op}: recursive acquire by {me:?}");
                    state = self
                        .released
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                other => panic!("{op}: mutex is {other:?}"),
            }
        }
    }
}

impl Default for KMutex {
    fn default() -> Self {
        Self::new()
    }
}
