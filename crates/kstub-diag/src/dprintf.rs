//! Conditional debug printing.
//!
//! `dprintf!` statements are cheap when the process-wide [`DebugFilter`]
//! does not select them. Selected statements are written to stdout as one
//! line group while holding the stdout lock, so concurrent threads do not
//! interleave within a statement.

use std::fmt;
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};
use std::time::Instant;

use crate::filter::{DebugFilter, base_name};
use crate::sys;

static FILTER: RwLock<DebugFilter> = RwLock::new(DebugFilter::disabled());

/// Source location of a `dprintf!` statement.
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub file: &'static str,
    pub func: &'static str,
    pub line: u32,
}

/// Installs the process-wide filter, replacing the previous one.
pub fn install_filter(filter: DebugFilter) {
    tracing::debug!(filter = ?filter.as_str(), "debug filter installed");
    *FILTER.write().unwrap_or_else(PoisonError::into_inner) = filter;
}

/// Returns a copy of the process-wide filter.
pub fn current_filter() -> DebugFilter {
    FILTER.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Formats a statement under `filter`, or returns `None` if it is not selected.
pub fn render(filter: &DebugFilter, site: &Site, args: fmt::Arguments<'_>) -> Option<String> {
    if !filter.selects(site.file, site.func) {
        return None;
    }

    let file = base_name(site.file);
    let mut out = String::new();
    if filter.matches("pid") {
        let _ = write!(out, "{} ", std::process::id());
    }
    if filter.matches("tid") {
        let _ = write!(out, "{} ", thread_seq());
    }
    if filter.matches("cpu") {
        let _ = write!(out, "{} ", sys::current_cpu().unwrap_or(0));
    }
    if filter.matches("time") {
        let _ = write!(out, "{} ", hrtime());
    }
    if filter.matches("long") {
        let _ = write!(out, "{file}, line {}: ", site.line);
    }
    let _ = write!(out, "{}: {args}", site.func);
    Some(out)
}

/// Prints a statement if the process-wide filter selects it.
///
/// Called by [`dprintf!`](crate::dprintf); not meant to be used directly.
pub fn emit(site: &Site, args: fmt::Arguments<'_>) {
    let filter = FILTER.read().unwrap_or_else(PoisonError::into_inner);
    if let Some(line) = render(&filter, site, args) {
        drop(filter);
        tracing::debug!(file = site.file, func = site.func, line = site.line, "{}", line.trim_end());
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(line.as_bytes());
        let _ = stdout.flush();
    }
}

/// Small sequential id for the calling thread, stable for its lifetime.
pub fn thread_seq() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static SEQ: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    SEQ.with(|seq| *seq)
}

/// Monotonic nanoseconds since the first call in this process.
pub fn hrtime() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Name of the enclosing function, without its module path.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        let name = ::std::any::type_name_of_val(&f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        let name = name.trim_end_matches("::{{closure}}");
        match name.rfind("::") {
            Some(pos) => &name[pos + 2..],
            None => name,
        }
    }};
}

/// Prints a debug statement if the filter selects this file or function.
///
/// ```
/// kstub_diag::dprintf!("txg {} synced\n", 42);
/// ```
#[macro_export]
macro_rules! dprintf {
    ($($arg:tt)*) => {
        $crate::dprintf::emit(
            &$crate::dprintf::Site {
                file: file!(),
                func: $crate::function_name!(),
                line: line!(),
            },
            format_args!($($arg)*),
        )
    };
}
