//! Named caches of fixed-size objects.
//!
//! A [`KmemCache`] is bookkeeping around the backing allocator: it has no
//! slabs, magazines or free lists. Every allocation draws a fresh zero-filled
//! block, runs the constructor, and counts the object as live until it is
//! freed. Alignment is recorded but not applied.
//!
//! Caches do no locking of their own beyond an atomic live counter. Callers
//! sharing one cache between threads serialize access to their objects.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use kstub_diag::dprintf;

use crate::policy::{KmFlags, KmemPolicy};

/// Maximum cache name length in bytes.
pub const CACHE_NAMELEN: usize = 31;

/// Name given to caches created without one.
pub const ANON_CACHE_NAME: &str = "kstub anon kmem cache";

/// Size charged to the backing allocator for a cache's own bookkeeping.
const CACHE_HEADER_SIZE: usize = 64;

/// Object constructor. A nonzero return fails the allocation.
pub type Constructor<P> = Box<dyn Fn(&mut [u8], &P, KmFlags) -> i32 + Send + Sync>;
/// Object destructor.
pub type Destructor<P> = Box<dyn Fn(&mut [u8], &P) + Send + Sync>;
/// Memory reclaim hook. Recorded but never driven.
pub type Reclaim<P> = Box<dyn Fn(&P) + Send + Sync>;

/// Creation parameters for a [`KmemCache`].
pub struct CacheSpec<P> {
    name: String,
    object_size: usize,
    align: usize,
    constructor: Option<Constructor<P>>,
    destructor: Option<Destructor<P>>,
    reclaim: Option<Reclaim<P>>,
    private: P,
}

impl CacheSpec<()> {
    /// A cache of `object_size` byte objects with no hooks.
    pub fn new(name: impl Into<String>, object_size: usize) -> Self {
        Self::with_private(name, object_size, ())
    }
}

impl<P> CacheSpec<P> {
    /// A cache whose hooks receive `private` on every call.
    pub fn with_private(name: impl Into<String>, object_size: usize, private: P) -> Self {
        Self {
            name: name.into(),
            object_size,
            align: 0,
            constructor: None,
            destructor: None,
            reclaim: None,
            private,
        }
    }

    pub fn align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    pub fn constructor(
        mut self,
        constructor: impl Fn(&mut [u8], &P, KmFlags) -> i32 + Send + Sync + 'static,
    ) -> Self {
        self.constructor = Some(Box::new(constructor));
        self
    }

    pub fn destructor(mut self, destructor: impl Fn(&mut [u8], &P) + Send + Sync + 'static) -> Self {
        self.destructor = Some(Box::new(destructor));
        self
    }

    pub fn reclaim(mut self, reclaim: impl Fn(&P) + Send + Sync + 'static) -> Self {
        self.reclaim = Some(Box::new(reclaim));
        self
    }
}

/// An object allocated from a [`KmemCache`].
///
/// Must be handed back with [`KmemCache::free`]; dropping it leaks it from
/// the cache's point of view.
pub struct KmemObject {
    buf: Vec<u8>,
    cache_id: u64,
}

impl KmemObject {
    /// Id of the cache that allocated this object.
    pub fn cache_id(&self) -> u64 {
        self.cache_id
    }
}

impl Deref for KmemObject {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for KmemObject {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl fmt::Debug for KmemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmemObject")
            .field("cache_id", &self.cache_id)
            .field("len", &self.buf.len())
            .finish()
    }
}

/// A named cache of fixed-size objects.
pub struct KmemCache<P = ()> {
    id: u64,
    name: String,
    object_size: usize,
    align: usize,
    constructor: Option<Constructor<P>>,
    destructor: Option<Destructor<P>>,
    reclaim: Option<Reclaim<P>>,
    private: P,
    live: AtomicUsize,
    /// Bookkeeping block charged to the backing allocator, released on destroy.
    header: Vec<u8>,
    policy: Arc<KmemPolicy>,
}

impl<P> KmemCache<P> {
    /// Creates a cache under `policy`'s no-fail protocol.
    ///
    /// Returns `None` only when `flags` lacks [`KmFlags::NOFAIL`] and the
    /// bookkeeping allocation fails.
    pub fn create(policy: &Arc<KmemPolicy>, spec: CacheSpec<P>, flags: KmFlags) -> Option<Self> {
        let header = policy.alloc(CACHE_HEADER_SIZE, flags)?;

        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let name = bounded_name(&spec.name);
        dprintf!("cache {name} created, object size {}\n", spec.object_size);

        Some(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            object_size: spec.object_size,
            align: spec.align,
            constructor: spec.constructor,
            destructor: spec.destructor,
            reclaim: spec.reclaim,
            private: spec.private,
            live: AtomicUsize::new(0),
            header,
            policy: Arc::clone(policy),
        })
    }

    /// Destroys the cache and returns the number of objects still live.
    ///
    /// Outstanding objects are an anomaly in the caller, reported but not
    /// fatal.
    pub fn destroy(self) -> usize {
        let live = self.live();
        if live != 0 {
            tracing::warn!(
                cache = %self.name,
                live,
                "destroying kmem cache with active objects"
            );
        }
        dprintf!("cache {} destroyed\n", self.name);
        self.policy.free(self.header);
        live
    }

    /// Allocates one object, running the constructor.
    pub fn alloc(&self, flags: KmFlags) -> Option<KmemObject> {
        let object = self.policy.run(flags, || self.construct())?;
        self.live.fetch_add(1, Ordering::Relaxed);
        Some(object)
    }

    /// Runs the destructor and releases `object`.
    pub fn free(&self, mut object: KmemObject) {
        assert!(
            object.cache_id == self.id,
            "kmem_cache_free: object from cache {} freed to cache {} ({})",
            object.cache_id,
            self.id,
            self.name
        );
        if let Some(destructor) = &self.destructor {
            destructor(&mut object.buf, &self.private);
        }
        drop(object);
        let prev = self.live.fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "kmem_cache_free: live count underflow in {}", self.name);
    }

    fn construct(&self) -> Option<KmemObject> {
        let mut buf = self.policy.backing().allocate(self.object_size)?;
        if let Some(constructor) = &self.constructor {
            if constructor(&mut buf, &self.private, KmFlags::DEFAULT) != 0 {
                return None;
            }
        }
        Some(KmemObject {
            buf,
            cache_id: self.id,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Number of objects allocated and not yet freed.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn has_reclaim(&self) -> bool {
        self.reclaim.is_some()
    }

    pub fn private(&self) -> &P {
        &self.private
    }
}

impl<P> fmt::Debug for KmemCache<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmemCache")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("object_size", &self.object_size)
            .field("live", &self.live())
            .finish_non_exhaustive()
    }
}

/// Applies the default name and truncates to [`CACHE_NAMELEN`] bytes.
fn bounded_name(name: &str) -> String {
    if name.is_empty() {
        return ANON_CACHE_NAME.to_string();
    }
    let mut end = name.len().min(CACHE_NAMELEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keeps_its_header_block() {
        let policy = Arc::new(KmemPolicy::new());
        let cache = KmemCache::create(&policy, CacheSpec::new("hdr", 8), KmFlags::DEFAULT).unwrap();
        assert_eq!(cache.header.len(), CACHE_HEADER_SIZE);
        assert_eq!(cache.destroy(), 0);
    }

    #[test]
    fn empty_name_becomes_anonymous() {
        assert_eq!(bounded_name(""), ANON_CACHE_NAME);
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "a".repeat(64);
        assert_eq!(bounded_name(&long).len(), CACHE_NAMELEN);
        assert_eq!(bounded_name("dnode_t"), "dnode_t");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let name = format!("{}é", "x".repeat(30));
        let bounded = bounded_name(&name);
        assert_eq!(bounded, "x".repeat(30));
    }
}
