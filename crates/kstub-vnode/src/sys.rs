//! Process-wide state the std library does not expose.

/// Restores the previous file-creation mask when dropped.
#[must_use]
pub(crate) struct UmaskGuard {
    previous: libc::mode_t,
}

/// Clears the process umask so a creating open gets exactly the requested
/// mode. The mask is process-global; concurrent creating opens race on it.
#[allow(unsafe_code)]
pub(crate) fn permissive_umask() -> UmaskGuard {
    // SAFETY: umask only swaps an integer in the process credentials.
    let previous = unsafe { libc::umask(0) };
    UmaskGuard { previous }
}

impl Drop for UmaskGuard {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // SAFETY: as above.
        unsafe {
            libc::umask(self.previous);
        }
    }
}
