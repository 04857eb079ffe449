//! Opening files and moving bytes through vnodes.
//!
//! A [`Vfs`] carries the two pieces of policy the engine cannot see: how
//! block-device paths map onto their raw counterparts, and where writes are
//! torn in two for crash-consistency testing.

use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::sync::{Mutex, PoisonError};

use kstub_diag::dprintf;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::flags::FileFlags;
use crate::sys;
use crate::vnode::Vnode;
use crate::VnodeError;

/// Paths under this prefix are devices.
pub const DEVICE_PREFIX: &str = "/dev/";
/// Directory component naming block devices.
pub const BLOCK_DIR: &str = "/dsk/";
/// Directory component naming the matching character devices.
pub const RAW_DIR: &str = "/rdsk/";

/// Naming convention for block devices and their raw counterparts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePaths {
    prefix: String,
    block_dir: String,
    raw_dir: String,
}

impl DevicePaths {
    pub fn new(
        prefix: impl Into<String>,
        block_dir: impl Into<String>,
        raw_dir: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            block_dir: block_dir.into(),
            raw_dir: raw_dir.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `path` names a device.
    pub fn is_device(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Rewrites the first block directory component of `path` to the raw
    /// one, or returns `None` if there is none.
    pub fn raw_path(&self, path: &str) -> Option<String> {
        let at = path.find(&self.block_dir)?;
        let rest = &path[at + self.block_dir.len()..];
        Some(format!("{}{}{rest}", &path[..at], self.raw_dir))
    }
}

impl Default for DevicePaths {
    fn default() -> Self {
        Self::new(DEVICE_PREFIX, BLOCK_DIR, RAW_DIR)
    }
}

/// Where a write is torn into two positioned writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitPolicy {
    /// Uniformly random point in `[0, len)`.
    #[default]
    Random,
    /// Fixed point, clamped to the write length.
    Fixed(usize),
    /// One write, never torn.
    Disabled,
}

/// Starting directory for [`Vfs::open_at`].
#[derive(Debug, Clone, Copy)]
pub enum StartDir<'a> {
    /// The process-wide root.
    Root,
    /// An open directory vnode. Not supported.
    Dir(&'a Vnode),
}

/// Direction and buffer of a [`Vfs::rdwr`] transfer.
#[derive(Debug)]
pub enum Uio<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl Uio<'_> {
    pub fn len(&self) -> usize {
        match self {
            Uio::Read(buf) => buf.len(),
            Uio::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Vnode operations under a device convention and write-split policy.
#[derive(Debug)]
pub struct Vfs {
    devices: DevicePaths,
    split: SplitPolicy,
    rng: Mutex<SmallRng>,
}

impl Vfs {
    /// Standard device paths, random splits seeded from the OS.
    pub fn new() -> Self {
        Self {
            devices: DevicePaths::default(),
            split: SplitPolicy::default(),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    pub fn with_devices(mut self, devices: DevicePaths) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    /// Makes random split points reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(SmallRng::seed_from_u64(seed));
        self
    }

    pub fn devices(&self) -> &DevicePaths {
        &self.devices
    }

    pub fn split_policy(&self) -> SplitPolicy {
        self.split
    }

    /// Opens `path`, creating it with `mode` if `flags` contains `FCREAT`.
    ///
    /// Device paths are sized through the block device and then opened
    /// through the raw one, since character devices report a size of zero.
    /// Other paths must exist unless the open creates them. On failure
    /// nothing is allocated.
    pub fn open(&self, path: &str, flags: FileFlags, mode: u32) -> Result<Vnode, VnodeError> {
        let (real, device_size) = if self.devices.is_device(path) {
            let size = device_size(path)?;
            let real = match self.devices.raw_path(path) {
                Some(raw) => {
                    tracing::debug!(path, raw = %raw, "redirecting to raw device");
                    raw
                }
                None => path.to_string(),
            };
            (real, Some(size))
        } else {
            if !flags.creates() {
                fs::metadata(path).map_err(|e| VnodeError::at(path, e))?;
            }
            (path.to_string(), None)
        };

        let opened = {
            let _umask = flags.creates().then(sys::permissive_umask);
            flags.open_options(mode).open(&real)
        };
        let file = opened.map_err(|e| VnodeError::at(&real, e))?;
        let size = match device_size {
            Some(size) => size,
            None => file.metadata().map_err(|e| VnodeError::at(&real, e))?.len(),
        };

        tracing::trace!(path, size, ?flags, "vnode opened");
        Ok(Vnode {
            file,
            size,
            path: path.to_string(),
        })
    }

    /// Opens `path` relative to `start`, which must be the root.
    pub fn open_at(
        &self,
        path: &str,
        flags: FileFlags,
        mode: u32,
        start: StartDir<'_>,
    ) -> Result<Vnode, VnodeError> {
        assert!(
            matches!(start, StartDir::Root),
            "vn_openat: start directory must be the root"
        );
        self.open(&format!("/{path}"), flags, mode)
    }

    /// Reads or writes `uio` at `offset`.
    ///
    /// Reads are a single positioned read. Writes are torn at the policy's
    /// split point into two positioned writes whose counts are summed. With
    /// `resid` the untransferred byte count is stored there; without it a
    /// short transfer is an error.
    pub fn rdwr(
        &self,
        vnode: &Vnode,
        uio: Uio<'_>,
        offset: u64,
        resid: Option<&mut usize>,
    ) -> Result<(), VnodeError> {
        let requested = uio.len();
        let done = match uio {
            Uio::Read(buf) => vnode.pread(buf, offset)?,
            Uio::Write(buf) => self.split_write(vnode, buf, offset)?,
        };

        match resid {
            Some(resid) => *resid = requested - done,
            None if done != requested => {
                return Err(VnodeError::ShortTransfer {
                    path: vnode.path.clone(),
                    requested,
                    done,
                });
            }
            None => {}
        }
        Ok(())
    }

    /// Closes `vnode`, releasing its descriptor.
    pub fn close(&self, vnode: Vnode) {
        tracing::trace!(path = %vnode.path, "vnode closed");
        drop(vnode);
    }

    fn split_write(&self, vnode: &Vnode, buf: &[u8], offset: u64) -> Result<usize, VnodeError> {
        let Some(split) = self.split_point(buf.len()) else {
            return vnode.pwrite(buf, offset);
        };
        dprintf!("{}: {} byte write torn at {split}\n", vnode.path, buf.len());
        let (head, tail) = buf.split_at(split);
        let first = vnode.pwrite(head, offset)?;
        let second = vnode.pwrite(tail, offset + split as u64)?;
        Ok(first + second)
    }

    fn split_point(&self, len: usize) -> Option<usize> {
        match self.split {
            SplitPolicy::Disabled => None,
            SplitPolicy::Fixed(at) => Some(at.min(len)),
            SplitPolicy::Random if len == 0 => Some(0),
            SplitPolicy::Random => {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                Some(rng.gen_range(0..len))
            }
        }
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

/// True size of a block device, found by seeking to its end.
fn device_size(path: &str) -> Result<u64, VnodeError> {
    let mut file = File::open(path).map_err(|e| VnodeError::at(path, e))?;
    file.seek(SeekFrom::End(0))
        .map_err(|e| VnodeError::at(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("/dev/dsk/c0t0d0s0", Some("/dev/rdsk/c0t0d0s0") ; "solaris disk")]
    #[test_case("/dev/zvol/dsk/pool/vol", Some("/dev/zvol/rdsk/pool/vol") ; "nested")]
    #[test_case("/dev/sda", None ; "no block dir")]
    #[test_case("/dev/dsk/a/dsk/b", Some("/dev/rdsk/a/dsk/b") ; "first component only")]
    fn raw_path_rewrite(path: &str, expected: Option<&str>) {
        assert_eq!(DevicePaths::default().raw_path(path).as_deref(), expected);
    }

    #[test]
    fn device_prefix_is_required() {
        let devices = DevicePaths::default();
        assert!(devices.is_device("/dev/dsk/x"));
        assert!(!devices.is_device("/tmp/dev/dsk/x"));
    }

    #[test_case(SplitPolicy::Fixed(3), 10, Some(3) ; "fixed inside")]
    #[test_case(SplitPolicy::Fixed(30), 10, Some(10) ; "fixed clamped")]
    #[test_case(SplitPolicy::Random, 0, Some(0) ; "random empty")]
    #[test_case(SplitPolicy::Disabled, 10, None ; "disabled")]
    fn split_points(policy: SplitPolicy, len: usize, expected: Option<usize>) {
        let vfs = Vfs::new().with_split(policy);
        assert_eq!(vfs.split_point(len), expected);
    }

    #[test]
    fn random_split_stays_below_len() {
        let vfs = Vfs::new().with_seed(7);
        for len in 1..200 {
            let split = vfs.split_point(len).unwrap();
            assert!(split < len);
        }
    }

    #[test]
    fn seeded_splits_repeat() {
        let a = Vfs::new().with_seed(42);
        let b = Vfs::new().with_seed(42);
        let sa: Vec<_> = (1..50).map(|n| a.split_point(n)).collect();
        let sb: Vec<_> = (1..50).map(|n| b.split_point(n)).collect();
        assert_eq!(sa, sb);
    }
}
