//! Open flags and their mapping onto `open(2)` through `std::fs::OpenOptions`.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

use bitflags::bitflags;

bitflags! {
    /// Flags accepted by [`Vfs::open`](crate::Vfs::open).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileFlags: u32 {
        const FREAD = 0x0001;
        const FWRITE = 0x0002;
        const FAPPEND = 0x0008;
        const FCREAT = 0x0100;
        const FTRUNC = 0x0200;
        const FEXCL = 0x0400;
    }
}

impl FileFlags {
    /// Read and write access.
    pub const RDWR: Self = Self::FREAD.union(Self::FWRITE);

    /// Whether the open may create the file.
    pub fn creates(self) -> bool {
        self.contains(Self::FCREAT)
    }

    /// Builds open options for these flags, creating files with `mode`.
    ///
    /// `FREAD` and `FWRITE` select the access mode, read-only when neither is
    /// set. The remaining bits pass straight through to `open(2)`, so any
    /// combination the platform accepts is accepted here.
    pub(crate) fn open_options(self, mode: u32) -> OpenOptions {
        let write = self.contains(Self::FWRITE);
        let mut opts = OpenOptions::new();
        opts.read(self.contains(Self::FREAD) || !write)
            .write(write)
            .custom_flags(self.open_bits())
            .mode(mode);
        opts
    }

    fn open_bits(self) -> i32 {
        [
            (Self::FAPPEND, libc::O_APPEND),
            (Self::FCREAT, libc::O_CREAT),
            (Self::FTRUNC, libc::O_TRUNC),
            (Self::FEXCL, libc::O_EXCL),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .fold(0, |bits, (_, bit)| bits | bit)
    }
}
