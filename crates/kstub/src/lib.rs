//! # kstub: kernel services for a userland storage engine
//!
//! A storage engine written against kernel interfaces runs inside an
//! ordinary process by linking against this crate. The pieces live in their
//! own crates and are re-exported here:
//!
//! | Module   | Provides                                              |
//! |----------|-------------------------------------------------------|
//! | [`diag`] | `dprintf!`, `cmn_err`, `vpanic`, `verify!`            |
//! | [`sync`] | `KMutex`, `KRwLock`, `KCondvar`, threads and ticks    |
//! | [`kmem`] | object caches and the no-fail allocation protocol     |
//! | [`vnode`]| file and device I/O, the bootstrap reader             |
//!
//! This crate adds the lifecycle around the engine, configuration, and a
//! few leftover routines.
//!
//! ```no_run
//! use kstub::{FileFlags, KernelContext, KstubConfig, StorageEngine};
//!
//! struct Engine;
//!
//! impl StorageEngine for Engine {
//!     fn init(&mut self, _mode: FileFlags) {}
//!     fn fini(&mut self) {}
//! }
//!
//! # fn main() -> Result<(), kstub::ConfigError> {
//! kstub::init_tracing();
//! let mut args: Vec<String> = std::env::args().collect();
//! let config = KstubConfig::load(None, &mut args)?;
//! let mut ctx = KernelContext::new(config);
//! let mut engine = Engine;
//! kstub::kernel_init(&mut ctx, &mut engine, FileFlags::RDWR);
//! kstub::kernel_fini(&mut ctx, &mut engine);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod lifecycle;
mod misc;
mod sys;

pub use kstub_diag as diag;
pub use kstub_kmem as kmem;
pub use kstub_sync as sync;
pub use kstub_vnode as vnode;

pub use config::{DebugConfig, KstubConfig, SEED_ENV_VAR, SplitMode, VnodeConfig};
pub use error::ConfigError;
pub use kstub_vnode::FileFlags;
pub use lifecycle::{KernelContext, OUT_OF_MEMORY_MESSAGE, StorageEngine, kernel_fini, kernel_init};
pub use misc::{highbit, random_get_bytes, random_get_pseudo_bytes};
pub use sys::{page_size, physmem};

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, writing to stderr.
///
/// Stdout is left to `dprintf!`. Calling this more than once is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
