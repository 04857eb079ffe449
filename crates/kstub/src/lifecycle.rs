//! Bringing the emulated kernel up and down around the engine.

use std::io::Write as _;
use std::sync::Arc;

use kstub_diag::{dprintf, install_filter};
use kstub_kmem::KmemPolicy;
use kstub_vnode::{FileFlags, Vfs};

use crate::config::KstubConfig;
use crate::sys;

/// Message written when a no-fail allocation cannot be satisfied after
/// [`kernel_init`].
pub const OUT_OF_MEMORY_MESSAGE: &str = "out of memory -- generating core dump\n";

/// The engine under test, entered only through these two calls.
pub trait StorageEngine {
    /// Starts the engine with the given access mode.
    fn init(&mut self, mode: FileFlags);

    /// Stops the engine.
    fn fini(&mut self);
}

/// Process-wide services shared with the engine.
#[derive(Debug)]
pub struct KernelContext {
    config: KstubConfig,
    kmem: Arc<KmemPolicy>,
    vfs: Vfs,
    physmem: u64,
}

impl KernelContext {
    pub fn new(config: KstubConfig) -> Self {
        let vfs = config.vfs();
        Self {
            config,
            kmem: Arc::new(KmemPolicy::new()),
            vfs,
            physmem: 0,
        }
    }

    /// Replaces the allocation policy, e.g. with one backed by test doubles.
    pub fn with_kmem(mut self, kmem: Arc<KmemPolicy>) -> Self {
        self.kmem = kmem;
        self
    }

    pub fn config(&self) -> &KstubConfig {
        &self.config
    }

    pub fn kmem(&self) -> &Arc<KmemPolicy> {
        &self.kmem
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    /// Physical memory in pages as sampled by [`kernel_init`], 0 before.
    pub fn physmem(&self) -> u64 {
        self.physmem
    }
}

/// Starts the emulated kernel and then the engine.
///
/// Installs the debug filter and an out-of-memory no-fail callback that
/// aborts the process, samples physical memory, and calls
/// [`StorageEngine::init`] with `mode`.
pub fn kernel_init(ctx: &mut KernelContext, engine: &mut impl StorageEngine, mode: FileFlags) {
    install_filter(ctx.config.debug_filter());
    ctx.kmem.set_nofail_callback(out_of_memory);

    ctx.physmem = sys::physmem().unwrap_or(0);
    let bytes = ctx.physmem.saturating_mul(sys::page_size().unwrap_or(0));
    #[allow(clippy::cast_precision_loss)]
    let gigabytes = bytes as f64 / f64::from(1u32 << 30);
    dprintf!("physmem = {} pages ({gigabytes:.2} GB)\n", ctx.physmem);

    tracing::info!(physmem = ctx.physmem, ?mode, "kernel initialized");
    engine.init(mode);
}

/// Stops the engine and restores the default no-fail callback.
pub fn kernel_fini(ctx: &mut KernelContext, engine: &mut impl StorageEngine) {
    engine.fini();
    ctx.kmem.reset_nofail_callback();
    tracing::info!("kernel finished");
}

fn out_of_memory() -> i32 {
    let mut stderr = std::io::stderr().lock();
    let _ = stderr.write_all(OUT_OF_MEMORY_MESSAGE.as_bytes());
    let _ = stderr.flush();
    std::process::abort()
}
