//! The vnode handle.

use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::VnodeError;

/// An open file as seen by the engine.
///
/// Holds the descriptor, the size captured when it was opened and the path
/// the caller asked for. For raw devices the path is the block-device name,
/// not the character device actually opened.
#[derive(Debug)]
pub struct Vnode {
    pub(crate) file: File,
    pub(crate) size: u64,
    pub(crate) path: String,
}

/// Attributes reported by [`Vnode::getattr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VnodeAttr {
    pub size: u64,
}

impl Vnode {
    /// The untranslated path this vnode was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Size in bytes captured at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Attributes as cached at open time.
    pub fn getattr(&self) -> VnodeAttr {
        VnodeAttr { size: self.size }
    }

    /// Flushes file data and metadata to stable storage.
    pub fn fsync(&self) -> Result<(), VnodeError> {
        self.file
            .sync_all()
            .map_err(|e| VnodeError::at(&self.path, e))
    }

    /// Live size from the descriptor, bypassing the cached value.
    pub(crate) fn fstat_size(&self) -> Result<u64, VnodeError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| VnodeError::at(&self.path, e))
    }

    pub(crate) fn pread(&self, buf: &mut [u8], offset: u64) -> Result<usize, VnodeError> {
        self.file
            .read_at(buf, offset)
            .map_err(|e| VnodeError::at(&self.path, e))
    }

    pub(crate) fn pwrite(&self, buf: &[u8], offset: u64) -> Result<usize, VnodeError> {
        self.file
            .write_at(buf, offset)
            .map_err(|e| VnodeError::at(&self.path, e))
    }
}
