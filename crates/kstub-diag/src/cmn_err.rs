//! Console messages and fatal errors.

use std::fmt;
use std::io::Write as _;

/// Severity of a [`cmn_err`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeLevel {
    /// Continuation of a previous message; printed verbatim.
    Cont,
    /// Informational. Suppressed to keep stress runs quiet.
    Note,
    /// Warning, printed with a `WARNING: ` prefix.
    Warn,
    /// Fatal. Never returns.
    Panic,
    /// Dropped.
    Ignore,
}

/// Formats a non-fatal message, or returns `None` if it is suppressed.
pub fn render(level: CeLevel, args: fmt::Arguments<'_>) -> Option<String> {
    match level {
        CeLevel::Cont => Some(args.to_string()),
        CeLevel::Warn => Some(format!("WARNING: {args}\n")),
        CeLevel::Note | CeLevel::Ignore | CeLevel::Panic => None,
    }
}

/// Reports a message at `level` on stderr. `CeLevel::Panic` aborts.
pub fn cmn_err(level: CeLevel, args: fmt::Arguments<'_>) {
    if level == CeLevel::Panic {
        vpanic(args);
    }
    if let Some(message) = render(level, args) {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(message.as_bytes());
    }
}

/// Prints `error: <message>` to stderr and aborts the process.
///
/// Aborting leaves a core file behind, which is the userland stand-in for a
/// kernel crash dump.
pub fn vpanic(args: fmt::Arguments<'_>) -> ! {
    tracing::error!(reason = %args, "kernel panic");
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "error: {args}");
    let _ = stderr.flush();
    std::process::abort()
}

/// Formats a message and aborts through [`vpanic`].
#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => {
        $crate::vpanic(format_args!($($arg)*))
    };
}

/// Formats a message and reports it through [`cmn_err`].
#[macro_export]
macro_rules! cmn_err {
    ($level:expr, $($arg:tt)*) => {
        $crate::cmn_err($level, format_args!($($arg)*))
    };
}

/// Always-on assertion. A false condition aborts through
/// [`vpanic`](crate::vpanic) with the stringified expression.
#[macro_export]
macro_rules! verify {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::kpanic!(
                "assertion failed: {}, file: {}, line: {}",
                stringify!($cond),
                file!(),
                line!()
            );
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::kpanic!(
                "assertion failed: {} ({}), file: {}, line: {}",
                stringify!($cond),
                format_args!($($arg)+),
                file!(),
                line!()
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(CeLevel::Cont, Some("pool ok") ; "cont is verbatim")]
    #[test_case(CeLevel::Warn, Some("WARNING: pool ok\n") ; "warn has prefix and newline")]
    #[test_case(CeLevel::Note, None ; "note is suppressed")]
    #[test_case(CeLevel::Ignore, None ; "ignore is dropped")]
    fn render_levels(level: CeLevel, expected: Option<&str>) {
        assert_eq!(render(level, format_args!("pool {}", "ok")).as_deref(), expected);
    }

    #[test]
    fn verify_passes_true_conditions() {
        let len = 3;
        crate::verify!(len == 3);
        crate::verify!(len > 0, "len was {len}");
    }
}
