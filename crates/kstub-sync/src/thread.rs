//! Detached kernel threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Handle describing a thread started by [`thread_create`].
///
/// The creator cannot join the thread; the handle only identifies it.
#[derive(Debug, Clone)]
pub struct KThread {
    id: ThreadId,
    name: String,
}

impl KThread {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Starts `func` on a new detached OS thread.
///
/// Failing to create a thread is fatal.
pub fn thread_create<F>(func: F) -> KThread
where
    F: FnOnce() + Send + 'static,
{
    static NEXT: AtomicU64 = AtomicU64::new(1);
    let name = format!("kstub-{}", NEXT.fetch_add(1, Ordering::Relaxed));

    let handle = match thread::Builder::new().name(name.clone()).spawn(func) {
        Ok(handle) => handle,
        Err(e) => kstub_diag::kpanic!("thread_create: cannot spawn {name}: {e}"),
    };
    let id = handle.thread().id();
    tracing::trace!(thread = %name, ?id, "kernel thread created");

    KThread { id, name }
}

/// Identity of the calling thread.
pub fn curthread() -> ThreadId {
    thread::current().id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn created_thread_runs_with_argument() {
        let (tx, rx) = mpsc::channel();
        let arg = 41_u32;
        let t = thread_create(move || {
            tx.send((arg + 1, curthread())).unwrap();
        });
        let (value, id) = rx.recv().unwrap();
        assert_eq!(value, 42);
        assert_eq!(id, t.id());
        assert_ne!(t.id(), curthread());
        assert!(t.name().starts_with("kstub-"));
    }

    #[test]
    fn thread_names_are_unique() {
        let a = thread_create(|| {});
        let b = thread_create(|| {});
        assert_ne!(a.name(), b.name());
    }
}
