//! Memory size queries through `sysconf`.

/// Page size in bytes.
#[allow(unsafe_code)]
pub fn page_size() -> Option<u64> {
    // SAFETY: sysconf reads a constant system parameter.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(size).ok().filter(|&size| size > 0)
}

/// Physical memory in pages.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[allow(unsafe_code)]
pub fn physmem() -> Option<u64> {
    // SAFETY: as above.
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    u64::try_from(pages).ok().filter(|&pages| pages > 0)
}

/// Physical memory in pages.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn physmem() -> Option<u64> {
    None
}
