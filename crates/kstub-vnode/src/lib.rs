//! # kstub-vnode: file I/O for the kstub kernel emulation layer
//!
//! The engine reaches its on-disk state through vnodes. This crate maps
//! those onto ordinary file descriptors:
//!
//! - [`Vfs::open`] / [`Vfs::open_at`]: open files and devices, sizing block
//!   devices through their block path and doing I/O through the raw path
//! - [`Vfs::rdwr`]: positioned reads, and writes torn into two system calls
//!   so a killed process leaves a partial write behind
//! - [`kobj_open_file`] and friends: the read-only bootstrap reader
//!
//! ```text
//! /dev/dsk/c0t0d0s0 ──size──▶ block device
//!        │
//!        └──rewrite──▶ /dev/rdsk/c0t0d0s0 ──I/O──▶ character device
//! ```
//!
//! Only Unix targets are supported.

mod error;
mod flags;
mod kobj;
mod sys;
mod vfs;
mod vnode;

pub use error::VnodeError;
pub use flags::FileFlags;
pub use kobj::{BootStat, KobjHandle, kobj_close_file, kobj_fstat, kobj_open_file, kobj_read_file};
pub use vfs::{BLOCK_DIR, DEVICE_PREFIX, DevicePaths, RAW_DIR, SplitPolicy, StartDir, Uio, Vfs};
pub use vnode::{Vnode, VnodeAttr};
