//! Positional read access to the backing device.
//!
//! Every other component reads through [`Device`]; no component keeps file-position state across
//! calls. `read_at` either delivers the full requested length or fails — short reads are not
//! returned to callers (spec.md §4.1).

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use spin::Mutex;

use crate::error::Fat32Error;

pub trait Device: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`, or fails.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, Fat32Error>;
}

/// A read-only disk image or block device opened via a plain file handle.
///
/// The mutex exists for the same reason the teacher crate wraps its block device in a lock: it
/// gives every caller a single serialization point even though `read_exact_at` itself needs no
/// shared seek cursor (it takes the offset as an argument, per POSIX `pread`).
pub struct FileDevice {
    file: Mutex<File>,
}

impl FileDevice {
    pub fn open(path: &Path) -> Result<Self, Fat32Error> {
        let file = File::open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Device for FileDevice {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, Fat32Error> {
        let mut buf = vec![0u8; len];
        let file = self.file.lock();
        match file.read_exact_at(&mut buf, offset) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Fat32Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read at offset {offset}, wanted {len} bytes"),
            ))),
            Err(e) => Err(Fat32Error::Io(e)),
        }
    }
}
