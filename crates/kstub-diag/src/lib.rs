//! # kstub-diag: diagnostics for the kstub kernel emulation layer
//!
//! Everything else in kstub depends on this crate for its debug output:
//!
//! - [`dprintf!`]: debug statements gated by a [`DebugFilter`] that selects
//!   by source file or function name
//! - [`cmn_err`]: severity-prefixed console messages
//! - [`vpanic`] / [`kpanic!`]: print and abort, leaving a core file
//! - [`verify!`]: assertion that stays on in release builds
//!
//! Structured logging for the layer itself goes through `tracing`; the
//! facilities here reproduce the kernel's own console conventions for the
//! engine under test.

pub mod cmn_err;
pub mod dprintf;
mod filter;
mod sys;

pub use cmn_err::{CeLevel, cmn_err, vpanic};
pub use dprintf::{Site, current_filter, install_filter};
pub use filter::{DEBUG_ARG_PREFIX, DEBUG_ENV_VAR, DebugFilter, base_name};
pub use sys::current_cpu;
