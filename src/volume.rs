//! The mounted volume: owns the device handle, the decoded geometry, and the FAT walker, and
//! exposes the read-only operations a caller (the FUSE adapter, a future non-FUSE consumer, test
//! code) actually wants — `getattr`, `readdir`, `read` — instead of making every caller juggle
//! `Geometry` and `FatWalker` references itself.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use crate::bpb::Geometry;
use crate::device::{Device, FileDevice};
use crate::dir::{self, DecodedEntry};
use crate::error::Fat32Error;
use crate::fat::FatWalker;
use crate::path::{self, Resolved};
use crate::reader;

/// What kind of filesystem object a [`Stat`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    File,
}

/// The attributes a caller needs to answer `getattr`, independent of whether they came from the
/// synthesized root entry or a real directory entry.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub inode: u64,
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

fn unix_mode(is_dir: bool, read_only: bool) -> u32 {
    let kind_bits: u32 = if is_dir { libc::S_IFDIR } else { libc::S_IFREG } as u32;
    let perm: u32 = if read_only { 0o444 } else { 0o777 };
    kind_bits | perm
}

/// A mounted FAT32 volume. Construction performs the full boot-sector validation chain (spec.md
/// §4.2); a successfully constructed `Volume` is guaranteed to have plausible geometry, though
/// individual operations can still surface `CorruptFat`/`CorruptChain`/`CorruptName` on access.
pub struct Volume {
    device: Arc<dyn Device>,
    geometry: Geometry,
    fat: FatWalker,
    mount_time: i64,
    uid: u32,
    gid: u32,
}

impl Volume {
    /// Opens `path` as a backing device and validates it as a FAT32 volume. `uid`/`gid` are the
    /// owner reported for every file, `mount_time` substitutes for any all-zero on-disk timestamp.
    pub fn open(path: &Path, uid: u32, gid: u32, mount_time: i64) -> Result<Self, Fat32Error> {
        let device: Arc<dyn Device> = Arc::new(FileDevice::open(path)?);
        let boot_sector = device.read_at(0, 512)?;

        let bytes_per_sector = u16::from_le_bytes([boot_sector[0x0B], boot_sector[0x0C]]) as u64;
        let reserved_sectors = u16::from_le_bytes([boot_sector[0x0E], boot_sector[0x0F]]) as u64;
        let fat_region_offset = reserved_sectors * bytes_per_sector;

        let fat_entry_zero_low_byte =
            FatWalker::read_fat_entry_zero_low_byte(device.as_ref(), fat_region_offset)?;
        let geometry = Geometry::decode(&boot_sector, fat_entry_zero_low_byte)?;
        let fat = FatWalker::new(device.clone(), geometry);

        Ok(Self {
            device,
            geometry,
            fat,
            mount_time,
            uid,
            gid,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn fat(&self) -> &FatWalker {
        &self.fat
    }

    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    pub fn mount_time(&self) -> i64 {
        self.mount_time
    }

    pub fn root_cluster(&self) -> u32 {
        self.geometry.root_cluster
    }

    /// Resolves `path` and returns its attributes (spec.md §4.6, §4.8).
    pub fn getattr(&self, path: &str) -> Result<Stat, Fat32Error> {
        match path::resolve(self, path)? {
            Resolved::Root => self.root_stat(),
            Resolved::Entry(entry) => self.entry_stat(&entry),
        }
    }

    /// Streams the entries of the directory at `path` to `sink` (spec.md §4.4).
    pub fn readdir(
        &self,
        path: &str,
        sink: impl FnMut(&str, DecodedEntry) -> ControlFlow<()>,
    ) -> Result<(), Fat32Error> {
        let cluster = match path::resolve(self, path)? {
            Resolved::Root => self.geometry.root_cluster,
            Resolved::Entry(entry) if entry.is_dir => entry.start_cluster,
            Resolved::Entry(_) => return Err(Fat32Error::NotDir),
        };
        dir::read_dir(&self.fat, self.device.as_ref(), cluster, self.mount_time, sink)
    }

    /// Returns the extended attribute `name` for the entry at `path` (spec.md §4.8). The only
    /// attribute defined is `debug.cluster`, the decimal start cluster of the resolved entry;
    /// any other name fails with `NoData`.
    pub fn getxattr(&self, path: &str, name: &str) -> Result<Vec<u8>, Fat32Error> {
        if name != "debug.cluster" {
            return Err(Fat32Error::NoData);
        }
        let cluster = match path::resolve(self, path)? {
            Resolved::Root => self.geometry.root_cluster,
            Resolved::Entry(entry) => entry.start_cluster,
        };
        Ok(cluster.to_string().into_bytes())
    }

    /// Reads up to `buf.len()` bytes of the file at `path` starting at `offset` (spec.md §4.7).
    pub fn read(&self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, Fat32Error> {
        let entry = match path::resolve(self, path)? {
            Resolved::Root => return Err(Fat32Error::NotDir),
            Resolved::Entry(entry) => entry,
        };
        if entry.is_dir {
            return Err(Fat32Error::NotDir);
        }
        reader::read_bytes(
            &self.fat,
            self.device.as_ref(),
            entry.start_cluster,
            entry.size as u64,
            offset,
            buf,
        )
    }

    fn root_stat(&self) -> Result<Stat, Fat32Error> {
        let clusters = self.fat.chain_length(self.geometry.root_cluster)?;
        Ok(Stat {
            inode: self.geometry.root_cluster as u64,
            kind: FileKind::Directory,
            mode: unix_mode(true, false),
            size: clusters * self.geometry.cluster_size as u64,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            atime: self.mount_time,
            mtime: self.mount_time,
            ctime: self.mount_time,
        })
    }

    fn entry_stat(&self, entry: &DecodedEntry) -> Result<Stat, Fat32Error> {
        let size = if entry.is_dir {
            self.fat.chain_length(entry.start_cluster)? * self.geometry.cluster_size as u64
        } else {
            entry.size as u64
        };
        Ok(Stat {
            inode: entry.start_cluster as u64,
            kind: if entry.is_dir {
                FileKind::Directory
            } else {
                FileKind::File
            },
            mode: unix_mode(entry.is_dir, entry.read_only),
            size,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            atime: entry.atime,
            mtime: entry.mtime,
            ctime: entry.ctime,
        })
    }
}
