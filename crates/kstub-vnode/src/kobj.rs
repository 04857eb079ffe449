//! Bootstrap file reader.
//!
//! A thin read-only layer over [`Vfs`] used while the engine loads its
//! configuration at startup. Names are resolved from the root directory.

use crate::flags::FileFlags;
use crate::vfs::{StartDir, Uio, Vfs};
use crate::vnode::Vnode;
use crate::VnodeError;

/// An open bootstrap file, or the invalid sentinel returned on failure.
#[derive(Debug)]
pub enum KobjHandle {
    Open(Vnode),
    Invalid,
}

impl KobjHandle {
    pub fn is_invalid(&self) -> bool {
        matches!(self, KobjHandle::Invalid)
    }

    fn vnode(&self) -> Result<&Vnode, VnodeError> {
        match self {
            KobjHandle::Open(vnode) => Ok(vnode),
            KobjHandle::Invalid => Err(VnodeError::BadHandle),
        }
    }
}

/// Result of [`kobj_fstat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootStat {
    pub size: u64,
}

/// Opens `name` read-only relative to the root.
///
/// Failure yields [`KobjHandle::Invalid`] and the cause is only logged.
pub fn kobj_open_file(vfs: &Vfs, name: &str) -> KobjHandle {
    match vfs.open_at(name, FileFlags::FREAD, 0, StartDir::Root) {
        Ok(vnode) => KobjHandle::Open(vnode),
        Err(error) => {
            tracing::debug!(name, %error, "bootstrap open failed");
            KobjHandle::Invalid
        }
    }
}

/// Reads into `buf` at `offset`, returning the number of bytes read.
///
/// A read past the end of the file returns fewer bytes, not an error.
pub fn kobj_read_file(
    vfs: &Vfs,
    file: &KobjHandle,
    buf: &mut [u8],
    offset: u64,
) -> Result<usize, VnodeError> {
    let vnode = file.vnode()?;
    let requested = buf.len();
    let mut resid = 0;
    vfs.rdwr(vnode, Uio::Read(buf), offset, Some(&mut resid))?;
    Ok(requested - resid)
}

/// Closes `file`. Closing the invalid handle does nothing.
pub fn kobj_close_file(vfs: &Vfs, file: KobjHandle) {
    if let KobjHandle::Open(vnode) = file {
        vfs.close(vnode);
    }
}

/// Returns the live size of `file`.
///
/// If the descriptor cannot be queried the file is closed and `file` is
/// left invalid.
pub fn kobj_fstat(vfs: &Vfs, file: &mut KobjHandle) -> Result<BootStat, VnodeError> {
    let size = file.vnode()?.fstat_size();
    match size {
        Ok(size) => Ok(BootStat { size }),
        Err(error) => {
            kobj_close_file(vfs, std::mem::replace(file, KobjHandle::Invalid));
            Err(error)
        }
    }
}
