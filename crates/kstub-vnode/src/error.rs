//! Vnode error types.

use std::io;

/// Errors from vnode operations.
///
/// Every variant maps to the platform error code the engine expects through
/// [`VnodeError::errno`].
#[derive(Debug, thiserror::Error)]
pub enum VnodeError {
    /// Underlying OS I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// File not found.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Fewer bytes moved than requested and no residual was asked for.
    #[error("short transfer on {path}: {done} of {requested} bytes")]
    ShortTransfer {
        path: String,
        requested: usize,
        done: usize,
    },

    /// Operation on an invalid bootstrap handle.
    #[error("invalid file handle")]
    BadHandle,
}

impl VnodeError {
    /// Classifies an OS error raised while operating on `path`.
    pub(crate) fn at(path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            VnodeError::NotFound {
                path: path.to_string(),
            }
        } else {
            VnodeError::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    /// Platform error code for this error.
    pub fn errno(&self) -> i32 {
        match self {
            VnodeError::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            VnodeError::NotFound { .. } => libc::ENOENT,
            VnodeError::ShortTransfer { .. } => libc::EIO,
            VnodeError::BadHandle => libc::EBADF,
        }
    }
}
