//! Out-of-memory policy for no-fail allocations.
//!
//! A request flagged [`KmFlags::NOFAIL`] promises its caller a non-null
//! result. When the backing allocator comes up empty, the process-wide
//! no-fail callback decides between one retry and process exit:
//!
//! ```text
//! attempt ──ok──▶ return
//!    │ fail
//!    ├─ not NOFAIL ─────────────▶ return None
//!    └─ NOFAIL ─▶ callback
//!                   ├─ CALLBACK_RETRY ─▶ attempt once more ─ok─▶ return
//!                   │                          └─fail─▶ exit(255)
//!                   ├─ callback_exit(s) ─▶ exit(s)
//!                   └─ anything else ─▶ log, exit(255)
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use bitflags::bitflags;

bitflags! {
    /// Allocation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KmFlags: u32 {
        /// Never fail. Exhaustion consults the no-fail callback.
        const NOFAIL = 0x0100;
    }
}

impl KmFlags {
    /// Normal request, may fail.
    pub const DEFAULT: Self = Self::empty();
}

/// Callback return value requesting a single retry.
pub const CALLBACK_RETRY: i32 = 0;

/// Exit status used whenever the protocol gives up on its own.
pub const NOFAIL_EXIT_STATUS: u8 = 255;

/// Callback return value requesting process exit with `status`.
pub const fn callback_exit(status: u8) -> i32 {
    0x100 | status as i32
}

/// Decoded no-fail callback result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoFailDecision {
    Retry,
    Exit(u8),
}

impl NoFailDecision {
    /// Decodes a raw callback code. Unrecognized codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        if code == CALLBACK_RETRY {
            Some(NoFailDecision::Retry)
        } else if code & !0xff == callback_exit(0) {
            Some(NoFailDecision::Exit((code & 0xff) as u8))
        } else {
            None
        }
    }
}

/// Consulted when a no-fail request cannot be satisfied.
///
/// Returns [`CALLBACK_RETRY`] or [`callback_exit`]`(status)`.
pub trait NoFailCallback: Send + Sync {
    fn on_exhausted(&self) -> i32;
}

impl<F> NoFailCallback for F
where
    F: Fn() -> i32 + Send + Sync,
{
    fn on_exhausted(&self) -> i32 {
        self()
    }
}

/// Ends the process when the protocol decides to give up.
pub trait Terminator: Send + Sync {
    fn terminate(&self, status: u8) -> !;
}

/// Exits the real process with the given status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, status: u8) -> ! {
        tracing::error!(status, "no-fail allocation gave up, exiting");
        std::process::exit(i32::from(status))
    }
}

/// Source of raw memory for caches and plain allocations.
pub trait Backing: Send + Sync {
    /// Returns a zero-filled buffer of exactly `size` bytes, or `None` when
    /// memory is exhausted.
    fn allocate(&self, size: usize) -> Option<Vec<u8>>;
}

/// Draws memory from the global allocator without aborting on exhaustion.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBacking;

impl Backing for SystemBacking {
    fn allocate(&self, size: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).ok()?;
        buf.resize(size, 0);
        Some(buf)
    }
}

/// The default no-fail callback: give up with status 255.
pub fn default_nofail_callback() -> i32 {
    callback_exit(NOFAIL_EXIT_STATUS)
}

/// Process-wide allocation policy shared by every cache.
///
/// Holds the replaceable no-fail callback along with the backing allocator
/// and terminator the protocol uses. Tests build one with failing backing
/// and a capturing terminator.
pub struct KmemPolicy {
    nofail: RwLock<Arc<dyn NoFailCallback>>,
    terminator: Arc<dyn Terminator>,
    backing: Arc<dyn Backing>,
}

impl KmemPolicy {
    /// System memory, real process exit, default callback.
    pub fn new() -> Self {
        Self {
            nofail: RwLock::new(Arc::new(default_nofail_callback)),
            terminator: Arc::new(ProcessExit),
            backing: Arc::new(SystemBacking),
        }
    }

    pub fn with_terminator(mut self, terminator: impl Terminator + 'static) -> Self {
        self.terminator = Arc::new(terminator);
        self
    }

    pub fn with_backing(mut self, backing: impl Backing + 'static) -> Self {
        self.backing = Arc::new(backing);
        self
    }

    /// Replaces the no-fail callback.
    pub fn set_nofail_callback(&self, callback: impl NoFailCallback + 'static) {
        *self.nofail.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(callback);
    }

    /// Restores the default no-fail callback.
    pub fn reset_nofail_callback(&self) {
        self.set_nofail_callback(default_nofail_callback);
    }

    pub(crate) fn backing(&self) -> &dyn Backing {
        &*self.backing
    }

    /// Runs `attempt` under the no-fail protocol.
    ///
    /// `attempt` is called at most twice, and the second call only happens
    /// when a no-fail request's callback asks for a retry.
    pub fn run<T>(&self, flags: KmFlags, mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
        let mut retried = false;
        loop {
            if let Some(value) = attempt() {
                return Some(value);
            }
            if retried {
                self.terminate(NOFAIL_EXIT_STATUS);
            }
            if !flags.contains(KmFlags::NOFAIL) {
                return None;
            }
            match self.consult() {
                NoFailDecision::Retry => retried = true,
                NoFailDecision::Exit(status) => self.terminate(status),
            }
        }
    }

    /// Allocates a zero-filled buffer of `size` bytes.
    pub fn alloc(&self, size: usize, flags: KmFlags) -> Option<Vec<u8>> {
        self.run(flags, || self.backing.allocate(size))
    }

    /// Same as [`alloc`](Self::alloc); memory is always zero-filled.
    pub fn zalloc(&self, size: usize, flags: KmFlags) -> Option<Vec<u8>> {
        self.alloc(size, flags)
    }

    /// Returns a buffer obtained from [`alloc`](Self::alloc).
    pub fn free(&self, buf: Vec<u8>) {
        drop(buf);
    }

    fn consult(&self) -> NoFailDecision {
        let callback = Arc::clone(&self.nofail.read().unwrap_or_else(PoisonError::into_inner));
        let code = callback.on_exhausted();
        NoFailDecision::from_code(code).unwrap_or_else(|| {
            tracing::error!(code, "no-fail callback returned unexpected value {code:#x}");
            NoFailDecision::Exit(NOFAIL_EXIT_STATUS)
        })
    }

    fn terminate(&self, status: u8) -> ! {
        self.terminator.terminate(status)
    }
}

impl Default for KmemPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KmemPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmemPolicy").finish_non_exhaustive()
    }
}
