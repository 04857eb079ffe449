//! Reader/writer lock with explicit enter/exit.
//!
//! The write side has a single owner, tracked like [`KMutex`](crate::KMutex).
//! The read side keeps the set of reading threads, so a reader can be checked
//! for ownership even while other readers share the lock. No fairness is
//! provided: a steady stream of readers can starve a writer.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

use crate::curthread;

/// Access mode requested from a [`KRwLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RwMode {
    Reader,
    Writer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RwState {
    Uninitialized,
    Active {
        writer: Option<ThreadId>,
        readers: Vec<ThreadId>,
    },
    Destroyed,
}

impl RwState {
    const fn unlocked() -> Self {
        RwState::Active {
            writer: None,
            readers: Vec::new(),
        }
    }
}

/// A reader/writer lock with owner tracking.
#[derive(Debug)]
pub struct KRwLock {
    state: Mutex<RwState>,
    changed: Condvar,
}

impl KRwLock {
    /// Creates an initialized, unlocked rwlock.
    pub const fn new() -> Self {
        Self::with_state(RwState::unlocked())
    }

    /// Creates an rwlock that must be [`init`](Self::init)ed before use.
    pub const fn uninit() -> Self {
        Self::with_state(RwState::Uninitialized)
    }

    const fn with_state(state: RwState) -> Self {
        Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
        }
    }

    pub fn init(&self) {
        let mut state = self.lock_state();
        assert!(
            *state == RwState::Uninitialized,
            "rw_init: rwlock already initialized"
        );
        *state = RwState::unlocked();
    }

    /// Destroys the lock. It must not be held.
    pub fn destroy(&self) {
        let mut state = self.lock_state();
        match &*state {
            RwState::Active { writer: None, readers } if readers.is_empty() => {}
            other => panic!("rw_destroy: rwlock is {other:?}"),
        }
        *state = RwState::Destroyed;
    }

    /// Acquires the lock in `mode`, blocking until it is available.
    pub fn enter(&self, mode: RwMode) {
        let me = curthread();
        let mut state = self.lock_state();
        loop {
            if Self::try_take(&mut state, me, mode, "rw_enter") {
                return;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Acquires the lock in `mode` if that is possible without blocking.
    pub fn try_enter(&self, mode: RwMode) -> bool {
        let me = curthread();
        let mut state = self.lock_state();
        Self::try_take(&mut state, me, mode, "rw_tryenter")
    }

    /// Releases the caller's hold, whichever side it is on.
    pub fn exit(&self) {
        let me = curthread();
        let mut state = self.lock_state();
        let (writer, readers) = active_mut(&mut state, "rw_exit");
        if *writer == Some(me) {
            *writer = None;
        } else if let Some(pos) = readers.iter().position(|&r| r == me) {
            readers.swap_remove(pos);
        } else {
            panic!("rw_exit: {me:?} does not hold rwlock");
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Converts the caller's read hold into a write hold.
    ///
    /// Succeeds only when the caller is the sole reader; otherwise the read
    /// hold is kept and false is returned.
    pub fn try_upgrade(&self) -> bool {
        let me = curthread();
        let mut state = self.lock_state();
        let (writer, readers) = active_mut(&mut state, "rw_tryupgrade");
        assert!(
            readers.contains(&me),
            "rw_tryupgrade: {me:?} does not hold rwlock as reader"
        );
        if readers.len() == 1 {
            readers.clear();
            *writer = Some(me);
            true
        } else {
            false
        }
    }

    /// Converts the caller's write hold into a read hold.
    pub fn downgrade(&self) {
        let me = curthread();
        let mut state = self.lock_state();
        let (writer, readers) = active_mut(&mut state, "rw_downgrade");
        assert!(
            *writer == Some(me),
            "rw_downgrade: {me:?} does not hold rwlock as writer"
        );
        *writer = None;
        readers.push(me);
        drop(state);
        self.changed.notify_all();
    }

    /// Thread holding the write side, if any.
    pub fn owner(&self) -> Option<ThreadId> {
        self.with_active("rw_owner", |writer, _| writer)
    }

    /// Threads currently holding the read side.
    pub fn readers(&self) -> Vec<ThreadId> {
        self.with_active("rw_readers", |_, readers| readers.to_vec())
    }

    /// Returns true if the caller holds the write side.
    pub fn write_held(&self) -> bool {
        let me = curthread();
        self.with_active("rw_write_held", |writer, _| writer == Some(me))
    }

    /// Returns true if any thread holds the read side.
    pub fn read_held(&self) -> bool {
        self.with_active("rw_read_held", |_, readers| !readers.is_empty())
    }

    /// Returns true if the lock is read-held or the caller holds it for writing.
    pub fn lock_held(&self) -> bool {
        let me = curthread();
        self.with_active("rw_lock_held", |writer, readers| {
            writer == Some(me) || !readers.is_empty()
        })
    }

    fn try_take(state: &mut RwState, me: ThreadId, mode: RwMode, op: &str) -> bool {
        let (writer, readers) = active_mut(state, op);
        assert!(
            *writer != Some(me) && !readers.contains(&me),
            "{op}: recursive acquire by {me:?}"
        );
        match mode {
            RwMode::Reader if writer.is_none() => {
                readers.push(me);
                true
            }
            RwMode::Writer if writer.is_none() && readers.is_empty() => {
                *writer = Some(me);
                true
            }
            _ => false,
        }
    }

    fn with_active<T>(&self, op: &str, f: impl FnOnce(Option<ThreadId>, &[ThreadId]) -> T) -> T {
        let state = self.lock_state();
        match &*state {
            RwState::Active { writer, readers } => f(*writer, readers),
            other => panic!("{op}: rwlock is {other:?}"),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RwState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn active_mut<'a>(
    state: &'a mut RwState,
    op: &str,
) -> (&'a mut Option<ThreadId>, &'a mut Vec<ThreadId>) {
    match state {
        RwState::Active { writer, readers } => (writer, readers),
        other => panic!("{op}: rwlock is {other:?}"),
    }
}

impl Default for KRwLock {
    fn default() -> Self {
        Self::new()
    }
}
