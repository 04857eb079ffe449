//! # kstub-kmem: object caches and allocation policy
//!
//! A behavioral stand-in for the kernel memory allocator:
//!
//! - [`KmemPolicy`]: the process-wide no-fail callback plus the backing
//!   allocator and terminator the protocol uses
//! - [`KmemCache`]: named fixed-size object caches with constructor,
//!   destructor and reclaim hooks and a live-object count
//! - [`KmemPolicy::alloc`] / [`KmemPolicy::zalloc`]: plain buffers under the
//!   same protocol
//!
//! No pooling is done. The point is to preserve the contracts the engine
//! relies on: a [`KmFlags::NOFAIL`] request either returns memory or ends the
//! process, and never hands its caller `None`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use kstub_kmem::{CacheSpec, KmFlags, KmemCache, KmemPolicy};
//!
//! let policy = Arc::new(KmemPolicy::new());
//! let spec = CacheSpec::with_private("arc_buf_t", 128, 0xa5_u8)
//!     .constructor(|buf, fill, _| {
//!         buf.fill(*fill);
//!         0
//!     });
//! let cache = KmemCache::create(&policy, spec, KmFlags::NOFAIL).unwrap();
//!
//! let obj = cache.alloc(KmFlags::NOFAIL).unwrap();
//! assert!(obj.iter().all(|&b| b == 0xa5));
//! cache.free(obj);
//! assert_eq!(cache.destroy(), 0);
//! ```

mod cache;
mod policy;

pub use cache::{
    ANON_CACHE_NAME, CACHE_NAMELEN, CacheSpec, Constructor, Destructor, KmemCache, KmemObject,
    Reclaim,
};
pub use policy::{
    Backing, CALLBACK_RETRY, KmFlags, KmemPolicy, NOFAIL_EXIT_STATUS, NoFailCallback,
    NoFailDecision, ProcessExit, SystemBacking, Terminator, callback_exit,
    default_nofail_callback,
};

#[cfg(test)]
mod tests;
