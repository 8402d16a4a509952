//! Error taxonomy for the decoder, the FUSE adapter, and the CLI.
//!
//! Every fallible core function returns `Result<T, Fat32Error>`. The FUSE adapter and the CLI each
//! have exactly one place where this enum is mapped onto their own error space (`libc` errno
//! constants and process exit codes respectively) instead of scattering the mapping across call sites.

use std::fmt;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Fat32Error {
    /// A device read failed or returned short.
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),

    /// Boot-sector validation rejected the volume.
    #[error("not a FAT32 volume: {0}")]
    NotFat32(String),

    /// The two FAT copies disagree at a queried entry.
    #[error("FAT mirrors disagree at cluster {cluster}: primary={primary:#010x} backup={backup:#010x}")]
    CorruptFat {
        cluster: u32,
        primary: u32,
        backup: u32,
    },

    /// A cluster chain ended before a file's declared size was read, or pointed at cluster 0/bad.
    #[error("corrupt cluster chain: {0}")]
    CorruptChain(String),

    /// A directory entry's 8.3 name contains a reserved byte, or an LFN's checksum is implausible.
    #[error("corrupt directory entry name: {0}")]
    CorruptName(String),

    /// Path resolution could not locate a component.
    #[error("not found")]
    NotFound,

    /// A non-terminal path component resolved to a non-directory.
    #[error("not a directory")]
    NotDir,

    /// Unknown extended-attribute name.
    #[error("no such extended attribute")]
    NoData,

    /// A caller-supplied buffer is too small for a debug xattr.
    #[error("buffer too small")]
    Range,
}

impl Fat32Error {
    /// Maps this error onto the libc errno the FUSE protocol expects in a reply, per the
    /// propagation policy in spec.md §7.
    pub fn to_errno(&self) -> i32 {
        match self {
            Fat32Error::NotFound => libc::ENOENT,
            Fat32Error::NotDir => libc::ENOTDIR,
            Fat32Error::NoData => libc::ENODATA,
            Fat32Error::Range => libc::ERANGE,
            Fat32Error::Io(_)
            | Fat32Error::NotFat32(_)
            | Fat32Error::CorruptFat { .. }
            | Fat32Error::CorruptChain(_)
            | Fat32Error::CorruptName(_) => libc::EIO,
        }
    }

    /// Validation failures at mount time abort the process; this renders the diagnostic message.
    pub fn mount_diagnostic(&self) -> String {
        format!("fat32fuse: {self}")
    }
}

impl fmt::Display for MountAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.mount_diagnostic())
    }
}

/// Thin wrapper so `main` can turn a mount-time error into exit code 1 without re-deriving the
/// diagnostic message twice.
pub struct MountAbort(pub Fat32Error);

impl std::error::Error for MountAbort {}
impl fmt::Debug for MountAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.mount_diagnostic())
    }
}
