//! # kstub-sync: kernel synchronization primitives in userland
//!
//! Shims over std threads, mutexes and condition variables that keep the
//! kernel's ownership contracts:
//!
//! - [`KMutex`]: non-recursive, explicit enter/exit, owner tracking
//! - [`KRwLock`]: reader/writer lock with writer owner and reader set
//! - [`KCondvar`]: waits release and re-acquire a [`KMutex`]
//! - [`thread_create`]: detached threads
//! - [`clock`]: `lbolt` tick clock and `delay`
//!
//! Misuse is a programming error, not a recoverable condition. Double
//! acquire, release by a non-owner, and any use of a destroyed primitive
//! panic with a message naming the operation. Release builds set
//! `panic = "abort"`, so these become process aborts.
//!
//! # Example
//!
//! ```
//! use kstub_sync::{KCondvar, KMutex};
//!
//! let lock = KMutex::new();
//! let cv = KCondvar::new();
//!
//! lock.enter();
//! assert!(lock.held());
//! cv.signal();
//! lock.exit();
//!
//! cv.destroy();
//! lock.destroy();
//! ```

pub mod clock;
mod condvar;
mod mutex;
mod rwlock;
mod thread;

pub use clock::{HZ, delay, lbolt};
pub use condvar::{KCondvar, TimedWait};
pub use mutex::KMutex;
pub use rwlock::{KRwLock, RwMode};
pub use thread::{KThread, curthread, thread_create};
