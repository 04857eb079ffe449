//! Platform queries that have no std equivalent.

/// CPU the calling thread is currently running on.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn current_cpu() -> Option<u32> {
    // SAFETY: sched_getcpu takes no arguments and only reads per-thread state.
    let cpu = unsafe { libc::sched_getcpu() };
    u32::try_from(cpu).ok()
}

/// CPU the calling thread is currently running on.
#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<u32> {
    None
}
