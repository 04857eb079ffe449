//! Allocation protocol tests for kstub-kmem.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;

use crate::{
    Backing, CALLBACK_RETRY, CacheSpec, KmFlags, KmemCache, KmemPolicy, SystemBacking,
    Terminator, callback_exit,
};

// ============================================================================
// Test Doubles
// ============================================================================

/// Panic payload standing in for process exit.
#[derive(Debug, PartialEq, Eq)]
struct Terminated(u8);

struct PanicTerminator;

impl Terminator for PanicTerminator {
    fn terminate(&self, status: u8) -> ! {
        panic::panic_any(Terminated(status))
    }
}

/// Fails the next `fail_next` allocations, then defers to system memory.
struct ScriptedBacking {
    fail_next: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedBacking {
    fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_next: AtomicUsize::new(times),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Backing for Arc<ScriptedBacking> {
    fn allocate(&self, size: usize) -> Option<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            None
        } else {
            SystemBacking.allocate(size)
        }
    }
}

fn policy_with(backing: &Arc<ScriptedBacking>) -> Arc<KmemPolicy> {
    Arc::new(
        KmemPolicy::new()
            .with_backing(Arc::clone(backing))
            .with_terminator(PanicTerminator),
    )
}

/// Counts callback invocations and answers with a fixed code.
fn counting_callback(policy: &KmemPolicy, code: i32) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    policy.set_nofail_callback(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        code
    });
    count
}

/// Runs `f`, returning the exit status if it terminated.
fn exit_status<T>(f: impl FnOnce() -> T) -> Option<u8> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(_) => None,
        Err(payload) => match payload.downcast::<Terminated>() {
            Ok(terminated) => Some(terminated.0),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// A cache whose constructor and destructor count their calls.
fn counted_cache(policy: &Arc<KmemPolicy>) -> KmemCache<Arc<(AtomicUsize, AtomicUsize)>> {
    let counters = Arc::new((AtomicUsize::new(0), AtomicUsize::new(0)));
    let spec = CacheSpec::with_private("counted", 32, counters)
        .constructor(|buf, counters, flags| {
            assert_eq!(flags, KmFlags::DEFAULT);
            buf[0] = 0xc0;
            counters.0.fetch_add(1, Ordering::SeqCst);
            0
        })
        .destructor(|buf, counters| {
            assert_eq!(buf[0], 0xc0);
            counters.1.fetch_add(1, Ordering::SeqCst);
        });
    KmemCache::create(policy, spec, KmFlags::DEFAULT).unwrap()
}

fn constructed(cache: &KmemCache<Arc<(AtomicUsize, AtomicUsize)>>) -> usize {
    cache.private().0.load(Ordering::SeqCst)
}

fn destructed(cache: &KmemCache<Arc<(AtomicUsize, AtomicUsize)>>) -> usize {
    cache.private().1.load(Ordering::SeqCst)
}

// ============================================================================
// Ordinary Allocation
// ============================================================================

#[test]
fn alloc_and_free_run_hooks_and_count() {
    let backing = ScriptedBacking::failing(0);
    let policy = policy_with(&backing);
    let cache = counted_cache(&policy);

    let a = cache.alloc(KmFlags::DEFAULT).unwrap();
    let b = cache.alloc(KmFlags::DEFAULT).unwrap();
    assert_eq!(a.len(), 32);
    assert_eq!(a[0], 0xc0);
    assert_eq!(cache.live(), 2);
    assert_eq!(constructed(&cache), 2);

    cache.free(a);
    assert_eq!(cache.live(), 1);
    assert_eq!(destructed(&cache), 1);
    cache.free(b);
    assert_eq!(cache.live(), 0);
    assert_eq!(cache.destroy(), 0);
}

#[test]
fn failure_without_nofail_has_no_side_effects() {
    let backing = ScriptedBacking::failing(0);
    let policy = policy_with(&backing);
    let cache = counted_cache(&policy);
    let callbacks = counting_callback(&policy, CALLBACK_RETRY);

    backing.fail_next.store(1, Ordering::SeqCst);
    assert!(cache.alloc(KmFlags::DEFAULT).is_none());

    assert_eq!(constructed(&cache), 0);
    assert_eq!(cache.live(), 0);
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
}

#[test]
fn constructor_failure_fails_the_allocation() {
    let policy = Arc::new(KmemPolicy::new().with_terminator(PanicTerminator));
    let spec = CacheSpec::new("picky", 8).constructor(|_, _, _| -1);
    let cache = KmemCache::create(&policy, spec, KmFlags::DEFAULT).unwrap();

    assert!(cache.alloc(KmFlags::DEFAULT).is_none());
    assert_eq!(cache.live(), 0);
}

#[test]
fn cache_metadata_is_kept() {
    let policy = Arc::new(KmemPolicy::new());
    let spec = CacheSpec::new("", 24).align(16).reclaim(|_| {});
    let cache = KmemCache::create(&policy, spec, KmFlags::DEFAULT).unwrap();

    assert_eq!(cache.name(), crate::ANON_CACHE_NAME);
    assert_eq!(cache.object_size(), 24);
    assert_eq!(cache.align(), 16);
    assert!(cache.has_reclaim());
}

#[test]
#[should_panic(expected = "kmem_cache_free")]
fn free_to_foreign_cache_is_detected() {
    let policy = Arc::new(KmemPolicy::new());
    let a = KmemCache::create(&policy, CacheSpec::new("a", 8), KmFlags::DEFAULT).unwrap();
    let b = KmemCache::create(&policy, CacheSpec::new("b", 8), KmFlags::DEFAULT).unwrap();
    let obj = a.alloc(KmFlags::DEFAULT).unwrap();
    b.free(obj);
}

#[test]
fn destroy_with_live_objects_reports_them() {
    let policy = Arc::new(KmemPolicy::new());
    let cache = KmemCache::create(&policy, CacheSpec::new("leaky", 16), KmFlags::DEFAULT).unwrap();
    let _kept = cache.alloc(KmFlags::DEFAULT).unwrap();
    let _also = cache.alloc(KmFlags::DEFAULT).unwrap();

    assert_eq!(cache.destroy(), 2);
}

// ============================================================================
// No-Fail Protocol
// ============================================================================

#[test]
fn retry_then_success_returns_object_after_one_callback() {
    let backing = ScriptedBacking::failing(0);
    let policy = policy_with(&backing);
    let cache = counted_cache(&policy);
    let callbacks = counting_callback(&policy, CALLBACK_RETRY);

    backing.fail_next.store(1, Ordering::SeqCst);
    let calls_before = backing.calls();
    let obj = cache.alloc(KmFlags::NOFAIL).unwrap();

    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    assert_eq!(backing.calls() - calls_before, 2);
    assert_eq!(constructed(&cache), 1);
    assert_eq!(cache.live(), 1);
    cache.free(obj);
    assert_eq!(cache.live(), 0);
}

#[test]
fn persistent_failure_terminates_with_255_after_one_retry() {
    let backing = ScriptedBacking::failing(0);
    let policy = policy_with(&backing);
    let cache = counted_cache(&policy);
    let callbacks = counting_callback(&policy, CALLBACK_RETRY);

    backing.fail_next.store(usize::MAX, Ordering::SeqCst);
    let calls_before = backing.calls();
    let status = exit_status(|| cache.alloc(KmFlags::NOFAIL));

    assert_eq!(status, Some(255));
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    assert_eq!(backing.calls() - calls_before, 2);
    assert_eq!(cache.live(), 0);
}

#[test]
fn default_callback_terminates_with_255() {
    let backing = ScriptedBacking::failing(usize::MAX);
    let policy = policy_with(&backing);

    let status = exit_status(|| policy.alloc(128, KmFlags::NOFAIL));
    assert_eq!(status, Some(255));
    assert_eq!(backing.calls(), 1);
}

#[test]
fn callback_exit_status_is_used() {
    let backing = ScriptedBacking::failing(usize::MAX);
    let policy = policy_with(&backing);
    counting_callback(&policy, callback_exit(3));

    assert_eq!(exit_status(|| policy.alloc(1, KmFlags::NOFAIL)), Some(3));
}

#[test]
fn unrecognized_callback_value_terminates_with_255() {
    let backing = ScriptedBacking::failing(usize::MAX);
    let policy = policy_with(&backing);
    let callbacks = counting_callback(&policy, 7);

    assert_eq!(exit_status(|| policy.alloc(1, KmFlags::NOFAIL)), Some(255));
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn cache_creation_follows_the_protocol() {
    let backing = ScriptedBacking::failing(1);
    let policy = policy_with(&backing);
    assert!(KmemCache::create(&policy, CacheSpec::new("c", 8), KmFlags::DEFAULT).is_none());

    backing.fail_next.store(1, Ordering::SeqCst);
    let callbacks = counting_callback(&policy, CALLBACK_RETRY);
    let cache = KmemCache::create(&policy, CacheSpec::new("c", 8), KmFlags::NOFAIL);
    assert!(cache.is_some());
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);

    backing.fail_next.store(usize::MAX, Ordering::SeqCst);
    let status = exit_status(|| KmemCache::create(&policy, CacheSpec::new("c", 8), KmFlags::NOFAIL));
    assert_eq!(status, Some(255));
}

#[test]
fn cache_header_is_drawn_from_backing() {
    let backing = ScriptedBacking::failing(0);
    let policy = policy_with(&backing);

    let cache = KmemCache::create(&policy, CacheSpec::new("hdr", 8), KmFlags::DEFAULT).unwrap();
    assert_eq!(backing.calls(), 1);
    let obj = cache.alloc(KmFlags::DEFAULT).unwrap();
    assert_eq!(backing.calls(), 2);
    cache.free(obj);
    assert_eq!(cache.destroy(), 0);
}

#[test]
fn reset_restores_default_callback() {
    let backing = ScriptedBacking::failing(usize::MAX);
    let policy = policy_with(&backing);
    counting_callback(&policy, callback_exit(9));
    policy.reset_nofail_callback();

    assert_eq!(exit_status(|| policy.zalloc(4, KmFlags::NOFAIL)), Some(255));
}

#[test]
fn plain_alloc_is_zero_filled() {
    let policy = KmemPolicy::new();
    let buf = policy.zalloc(100, KmFlags::DEFAULT).unwrap();
    assert_eq!(buf.len(), 100);
    assert!(buf.iter().all(|&b| b == 0));
    policy.free(buf);
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn live_count_tracks_outstanding_objects(ops in prop::collection::vec(any::<bool>(), 0..64)) {
        let policy = Arc::new(KmemPolicy::new());
        let cache = KmemCache::create(&policy, CacheSpec::new("prop", 8), KmFlags::DEFAULT).unwrap();
        let mut held = Vec::new();

        for alloc in ops {
            if alloc || held.is_empty() {
                held.push(cache.alloc(KmFlags::NOFAIL).unwrap());
            } else if let Some(obj) = held.pop() {
                cache.free(obj);
            }
            prop_assert_eq!(cache.live(), held.len());
        }

        for obj in held {
            cache.free(obj);
        }
        prop_assert_eq!(cache.destroy(), 0);
    }
}
