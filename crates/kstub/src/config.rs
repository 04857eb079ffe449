//! Layered configuration for the emulation layer.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file, if one is given
//! 3. Environment variables: `KSTUB_<SECTION>__<KEY>`, then the
//!    `KSTUB_SEED` and `ZFS_DEBUG` shorthands
//! 4. A `debug=<filter>` command-line argument
//!
//! ```toml
//! [debug]
//! filter = "spa.c,dbuf_read,tid"
//!
//! [vnode]
//! device_prefix = "/dev/"
//! split = { fixed = 512 }
//! seed = 1234
//! ```

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat, Map};
use kstub_diag::{DEBUG_ENV_VAR, DebugFilter};
use kstub_vnode::{BLOCK_DIR, DEVICE_PREFIX, DevicePaths, RAW_DIR, SplitPolicy, Vfs};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Prefix of environment variables naming config keys, as in
/// `KSTUB_VNODE__DEVICE_PREFIX`.
pub const ENV_PREFIX: &str = "KSTUB";

/// Environment variable seeding the write-split generator.
pub const SEED_ENV_VAR: &str = "KSTUB_SEED";

/// Main kstub configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KstubConfig {
    pub debug: DebugConfig,
    pub vnode: VnodeConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Comma-separated `dprintf!` filter.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VnodeConfig {
    pub device_prefix: String,
    pub block_dir: String,
    pub raw_dir: String,
    pub split: SplitMode,
    /// Seed for random split points. Unset seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for VnodeConfig {
    fn default() -> Self {
        Self {
            device_prefix: DEVICE_PREFIX.to_string(),
            block_dir: BLOCK_DIR.to_string(),
            raw_dir: RAW_DIR.to_string(),
            split: SplitMode::Random,
            seed: None,
        }
    }
}

/// Write tearing as written in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitMode {
    #[default]
    Random,
    Fixed(usize),
    Disabled,
}

impl From<SplitMode> for SplitPolicy {
    fn from(mode: SplitMode) -> Self {
        match mode {
            SplitMode::Random => SplitPolicy::Random,
            SplitMode::Fixed(at) => SplitPolicy::Fixed(at),
            SplitMode::Disabled => SplitPolicy::Disabled,
        }
    }
}

impl KstubConfig {
    /// Loads from all sources. `args` loses any `debug=` arguments.
    pub fn load(file: Option<&Path>, args: &mut Vec<String>) -> Result<Self, ConfigError> {
        Self::load_from(file, std::env::vars().collect(), args)
    }

    /// Loads with `env` standing in for the process environment.
    pub fn load_from(
        file: Option<&Path>,
        env: Map<String, String>,
        args: &mut Vec<String>,
    ) -> Result<Self, ConfigError> {
        let seed = match env.get(SEED_ENV_VAR) {
            Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
                ConfigError::EnvError {
                    var: SEED_ENV_VAR,
                    value: value.clone(),
                }
            })?),
            None => None,
        };
        let env_filter = env.get(DEBUG_ENV_VAR).cloned();
        let arg_filter = DebugFilter::from_args(args, None)
            .as_str()
            .map(str::to_string);

        let defaults = Self::default();
        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        // KSTUB_VNODE__SPLIT, KSTUB_DEBUG__FILTER, ...
        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .set_override_option("vnode.seed", seed)?
            .set_override_option("debug.filter", env_filter)?
            .set_override_option("debug.filter", arg_filter)?;

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reads a TOML file over the defaults, ignoring the environment.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_from(Some(path), Map::new(), &mut Vec::new())
    }

    pub fn debug_filter(&self) -> DebugFilter {
        match &self.debug.filter {
            Some(raw) => DebugFilter::new(raw.as_str()),
            None => DebugFilter::disabled(),
        }
    }

    /// Builds the vnode context this configuration describes.
    pub fn vfs(&self) -> Vfs {
        let vnode = &self.vnode;
        let vfs = Vfs::new()
            .with_devices(DevicePaths::new(
                vnode.device_prefix.as_str(),
                vnode.block_dir.as_str(),
                vnode.raw_dir.as_str(),
            ))
            .with_split(vnode.split.into());
        match vnode.seed {
            Some(seed) => vfs.with_seed(seed),
            None => vfs,
        }
    }
}
