//! Selection of which `dprintf!` statements are printed.
//!
//! The filter is a comma-separated list of tokens. A statement prints when
//! its source file base name or its function name appears as a token, or
//! when the `on` token is present. A handful of other tokens turn on line
//! prefixes instead of selecting statements:
//!
//! | Token  | Effect                                   |
//! |--------|------------------------------------------|
//! | `on`   | print every statement                    |
//! | `pid`  | prefix with the process id               |
//! | `tid`  | prefix with the calling thread's id      |
//! | `cpu`  | prefix with the CPU the caller runs on   |
//! | `time` | prefix with a monotonic nanosecond stamp |
//! | `long` | prefix with `file, line N:`              |
//!
//! The filter comes from a `debug=<filter>` command-line argument or the
//! [`DEBUG_ENV_VAR`] environment variable. The argument wins.

/// Environment variable consulted when no `debug=` argument is given.
pub const DEBUG_ENV_VAR: &str = "ZFS_DEBUG";

/// Command-line argument prefix carrying a filter.
pub const DEBUG_ARG_PREFIX: &str = "debug=";

/// Parsed debug filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugFilter {
    raw: Option<String>,
    print_all: bool,
}

impl DebugFilter {
    /// A filter that selects nothing.
    pub const fn disabled() -> Self {
        Self {
            raw: None,
            print_all: false,
        }
    }

    /// Builds a filter from a comma-separated token list.
    pub fn new(raw: impl Into<String>) -> Self {
        let mut filter = Self {
            raw: Some(raw.into()),
            print_all: false,
        };
        filter.print_all = filter.matches("on");
        filter
    }

    /// Resolves the filter from process arguments and an environment value.
    ///
    /// Every `debug=` argument after `args[0]` is removed from `args`; if
    /// several are present the last one wins. With no such argument the
    /// environment value is used.
    pub fn from_args(args: &mut Vec<String>, env: Option<String>) -> Self {
        let mut from_arg = None;
        let mut index = 1;
        while index < args.len() {
            if let Some(value) = args[index].strip_prefix(DEBUG_ARG_PREFIX) {
                from_arg = Some(value.to_string());
                args.remove(index);
            } else {
                index += 1;
            }
        }

        match from_arg.or(env) {
            Some(raw) => Self::new(raw),
            None => Self::disabled(),
        }
    }

    /// Resolves the filter from `std::env::args` and [`DEBUG_ENV_VAR`],
    /// returning the remaining arguments.
    pub fn from_process() -> (Self, Vec<String>) {
        let mut args: Vec<String> = std::env::args().collect();
        let filter = Self::from_args(&mut args, std::env::var(DEBUG_ENV_VAR).ok());
        (filter, args)
    }

    /// Returns true if `token` is one of the comma-separated entries.
    pub fn matches(&self, token: &str) -> bool {
        self.raw
            .as_deref()
            .is_some_and(|raw| raw.split(',').any(|entry| entry == token))
    }

    /// Returns true if every statement should print.
    pub fn print_all(&self) -> bool {
        self.print_all
    }

    /// Returns true if a statement from `file` in `func` should print.
    ///
    /// Only the base name of `file` is compared.
    pub fn selects(&self, file: &str, func: &str) -> bool {
        self.print_all || self.matches(base_name(file)) || self.matches(func)
    }

    /// Returns the raw filter string, if any.
    pub fn as_str(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

/// Strips leading directories from a source path.
pub fn base_name(file: &str) -> &str {
    file.rsplit(['/', '\\']).next().unwrap_or(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn matches_whole_tokens_only() {
        let filter = DebugFilter::new("spa.c,dbuf_read,pid");
        assert!(filter.matches("spa.c"));
        assert!(filter.matches("dbuf_read"));
        assert!(filter.matches("pid"));
        assert!(!filter.matches("spa"));
        assert!(!filter.matches("dbuf"));
        assert!(!filter.print_all());
    }

    #[test]
    fn on_token_prints_everything() {
        let filter = DebugFilter::new("time,on");
        assert!(filter.print_all());
        assert!(filter.selects("src/anything.rs", "whatever"));
    }

    #[test]
    fn selects_by_base_name_or_function() {
        let filter = DebugFilter::new("vnode.rs,kernel_init");
        assert!(filter.selects("crates/kstub-vnode/src/vnode.rs", "open"));
        assert!(filter.selects("crates/kstub/src/lifecycle.rs", "kernel_init"));
        assert!(!filter.selects("crates/kstub/src/lifecycle.rs", "kernel_fini"));
    }

    #[test]
    fn disabled_filter_selects_nothing() {
        let filter = DebugFilter::disabled();
        assert!(!filter.matches("on"));
        assert!(!filter.selects("a.rs", "f"));
        assert_eq!(filter.as_str(), None);
    }

    #[test]
    fn argument_is_stripped_and_overrides_env() {
        let mut argv = args(&["ztest", "-V", "debug=spa.c,on", "-T", "10"]);
        let filter = DebugFilter::from_args(&mut argv, Some("dmu.c".to_string()));

        assert_eq!(filter.as_str(), Some("spa.c,on"));
        assert_eq!(argv, args(&["ztest", "-V", "-T", "10"]));
    }

    #[test]
    fn last_argument_wins_and_all_are_stripped() {
        let mut argv = args(&["ztest", "debug=a.c", "debug=b.c"]);
        let filter = DebugFilter::from_args(&mut argv, None);

        assert_eq!(filter.as_str(), Some("b.c"));
        assert_eq!(argv, args(&["ztest"]));
    }

    #[test]
    fn program_name_is_never_treated_as_filter() {
        let mut argv = args(&["debug=prog"]);
        let filter = DebugFilter::from_args(&mut argv, None);

        assert_eq!(filter, DebugFilter::disabled());
        assert_eq!(argv.len(), 1);
    }

    #[test]
    fn env_used_without_argument() {
        let mut argv = args(&["ztest"]);
        let filter = DebugFilter::from_args(&mut argv, Some("on".to_string()));
        assert!(filter.print_all());
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("../common/spa.c"), "spa.c");
        assert_eq!(base_name("spa.c"), "spa.c");
        assert_eq!(base_name("src\\win.rs"), "win.rs");
    }
}
