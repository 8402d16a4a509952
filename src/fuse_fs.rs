//! The FUSE adapter: translates `fuser::Filesystem` calls into [`Volume`] operations.
//!
//! FUSE identifies files by `u64` inode, not by path, so this layer keeps two small tables: an
//! inode-to-path map populated lazily on `lookup`/`readdir`, and a handle table for the opaque
//! file handles `open`/`opendir` hand out. Every lookup failure or decode error is mapped through
//! [`Fat32Error::to_errno`] exactly once, at the reply boundary.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen,
    ReplyXattr, Request,
};

use crate::debug;
use crate::error::Fat32Error;
use crate::volume::{FileKind, Stat, Volume};

const TTL: Duration = Duration::from_secs(1);
const FUSE_ROOT_INODE: u64 = 1;

/// A file handle allocated by `open`/`opendir`: just the resolved path, reused on every `read`/
/// `readdir` call against that handle so we don't re-resolve the path each time.
struct Handle {
    path: String,
}

pub struct Fat32Fs {
    volume: Volume,
    inode_paths: Mutex<HashMap<u64, String>>,
    next_handle: AtomicU64,
    handles: Mutex<HashMap<u64, Handle>>,
}

impl Fat32Fs {
    pub fn new(volume: Volume) -> Self {
        let mut inode_paths = HashMap::new();
        inode_paths.insert(FUSE_ROOT_INODE, "/".to_string());
        Self {
            volume,
            inode_paths: Mutex::new(inode_paths),
            next_handle: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn path_for_inode(&self, inode: u64) -> Option<String> {
        if inode == FUSE_ROOT_INODE {
            return Some("/".to_string());
        }
        self.inode_paths.lock().unwrap().get(&inode).cloned()
    }

    fn remember(&self, inode: u64, path: &str) {
        self.inode_paths
            .lock()
            .unwrap()
            .entry(inode)
            .or_insert_with(|| path.to_string());
    }

    fn allocate_handle(&self, path: String) -> u64 {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().unwrap().insert(id, Handle { path });
        id
    }

    fn child_path(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        }
    }

    fn stat_for(&self, path: &str) -> Result<Stat, Fat32Error> {
        if debug::is_debug_path(path) {
            return self.debug_stat(path);
        }
        self.volume.getattr(path)
    }

    fn debug_stat(&self, path: &str) -> Result<Stat, Fat32Error> {
        let trimmed = path.trim_start_matches('/');
        if trimmed == debug::DEBUG_DIR_NAME {
            return Ok(debug::dir_stat(uid(), gid(), self.volume.mount_time()));
        }
        if trimmed == format!("{}/{}", debug::DEBUG_DIR_NAME, debug::GEOMETRY_FILE_NAME) {
            let contents = debug::render_geometry(self.volume.geometry());
            return Ok(debug::geometry_file_stat(
                uid(),
                gid(),
                self.volume.mount_time(),
                contents.len() as u64,
            ));
        }
        Err(Fat32Error::NotFound)
    }

    /// Builds the `(name, kind, inode)` listing for `readdir`, separated from the `fuser` reply
    /// plumbing so it can be exercised directly in tests.
    ///
    /// Neither the FUSE root nor `/.debug` is a real on-disk directory, so the decoder never
    /// yields "." / ".." for them and this synthesizes the pair instead. Every other directory's
    /// cluster stream already contains real "." / ".." short entries (dir.rs), so it's left to
    /// supply its own.
    fn list_directory_entries(
        &self,
        ino: u64,
        path: &str,
    ) -> Result<Vec<(String, FileType, u64)>, Fat32Error> {
        let mut entries: Vec<(String, FileType, u64)> = if path == "/" || debug::is_debug_path(path)
        {
            vec![
                (".".to_string(), FileType::Directory, ino),
                ("..".to_string(), FileType::Directory, ino),
            ]
        } else {
            Vec::new()
        };

        if path == "/" {
            entries.push((
                debug::DEBUG_DIR_NAME.to_string(),
                FileType::Directory,
                debug::DEBUG_DIR_INODE,
            ));
        } else if debug::is_debug_path(path) {
            for name in debug::entries() {
                entries.push((
                    name.to_string(),
                    FileType::RegularFile,
                    debug::GEOMETRY_FILE_INODE,
                ));
            }
        } else {
            self.volume.readdir(path, |name, entry| {
                let kind = if entry.is_dir {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                };
                entries.push((name.to_string(), kind, entry.start_cluster as u64));
                ControlFlow::Continue(())
            })?;
        }

        Ok(entries)
    }
}

fn uid() -> u32 {
    unsafe { libc::getuid() }
}

fn gid() -> u32 {
    unsafe { libc::getgid() }
}

fn to_file_attr(ino: u64, stat: &Stat) -> FileAttr {
    let kind = match stat.kind {
        FileKind::Directory => FileType::Directory,
        FileKind::File => FileType::RegularFile,
    };
    let to_time = |secs: i64| UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64);
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(512),
        atime: to_time(stat.atime),
        mtime: to_time(stat.mtime),
        ctime: to_time(stat.ctime),
        crtime: to_time(stat.ctime),
        kind,
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

impl Filesystem for Fat32Fs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for_inode(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = Self::child_path(&parent_path, name);

        match self.stat_for(&child_path) {
            Ok(stat) => {
                self.remember(stat.inode, &child_path);
                reply.entry(&TTL, &to_file_attr(stat.inode, &stat), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_for_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.stat_for(&path) {
            Ok(stat) => reply.attr(&TTL, &to_file_attr(ino, &stat)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let handle = self.allocate_handle(path);
        reply.opened(handle, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(Handle { path }) = self.handles.lock().unwrap().get(&fh).map(|h| Handle {
            path: h.path.clone(),
        }) else {
            reply.error(libc::EBADF);
            return;
        };

        let entries = match self.list_directory_entries(ino, &path) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        for (i, (name, kind, child_ino)) in entries.into_iter().enumerate().skip(offset as usize) {
            if name != "." && name != ".." {
                self.remember(child_ino, &Self::child_path(&path, &name));
            }
            if reply.add(child_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: fuser::ReplyEmpty) {
        self.handles.lock().unwrap().remove(&fh);
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let handle = self.allocate_handle(path);
        reply.opened(handle, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.handles.lock().unwrap().get(&fh).map(|h| h.path.clone()) else {
            reply.error(libc::EBADF);
            return;
        };
        let mut buf = vec![0u8; size as usize];

        let result = if debug::is_debug_path(&path) {
            let contents = debug::render_geometry(self.volume.geometry());
            let bytes = contents.as_bytes();
            let offset = offset.max(0) as usize;
            if offset >= bytes.len() {
                Ok(0)
            } else {
                let n = (bytes.len() - offset).min(buf.len());
                buf[..n].copy_from_slice(&bytes[offset..offset + n]);
                Ok(n)
            }
        } else {
            self.volume.read(&path, offset.max(0) as u64, &mut buf)
        };

        match result {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        self.handles.lock().unwrap().remove(&fh);
        reply.ok();
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let Some(path) = self.path_for_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::ENODATA);
            return;
        };

        let contents = if name == "user.fat32.geometry" && debug::is_debug_path(&path) {
            debug::render_geometry(self.volume.geometry())
        } else {
            match self.volume.getxattr(&path, name) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(_) => {
                        reply.error(libc::ENODATA);
                        return;
                    }
                },
                Err(e) => {
                    reply.error(e.to_errno());
                    return;
                }
            }
        };

        if size == 0 {
            reply.size(contents.len() as u32);
        } else if (size as usize) < contents.len() {
            reply.error(libc::ERANGE);
        } else {
            reply.data(contents.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::FileExt;

    use tempfile::NamedTempFile;

    use super::*;

    const BYTES_PER_SECTOR: u32 = 512;
    const RESERVED_SECTORS: u32 = 32;
    const FAT_COUNT: u32 = 2;
    const SECTORS_PER_FAT: u32 = 512;
    const ROOT_CLUSTER: u32 = 2;
    const TOTAL_SECTORS: u32 = 66_600;

    fn fat_region_offset() -> u64 {
        RESERVED_SECTORS as u64 * BYTES_PER_SECTOR as u64
    }

    fn backup_fat_offset() -> u64 {
        fat_region_offset() + SECTORS_PER_FAT as u64 * BYTES_PER_SECTOR as u64
    }

    fn cluster_offset(cluster: u32) -> u64 {
        let data_region_start_sector = RESERVED_SECTORS as u64 + FAT_COUNT as u64 * SECTORS_PER_FAT as u64;
        (data_region_start_sector + (cluster as u64 - 2)) * BYTES_PER_SECTOR as u64
    }

    fn set_fat_entry(file: &std::fs::File, cluster: u32, value: u32) {
        let bytes = value.to_le_bytes();
        file.write_at(&bytes, fat_region_offset() + cluster as u64 * 4).unwrap();
        file.write_at(&bytes, backup_fat_offset() + cluster as u64 * 4).unwrap();
    }

    fn short_entry(raw_name: &[u8; 11], attr: u8, start_cluster: u32, size: u32) -> [u8; 32] {
        let mut raw = [0u8; 32];
        raw[0..11].copy_from_slice(raw_name);
        raw[11] = attr;
        raw[20..22].copy_from_slice(&((start_cluster >> 16) as u16).to_le_bytes());
        raw[26..28].copy_from_slice(&(start_cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&size.to_le_bytes());
        raw
    }

    /// A root directory containing one subdirectory `SUB`, which in turn contains real "." / ".."
    /// entries (as a genuine on-disk FAT32 subdirectory does) plus one file.
    fn build_image() -> NamedTempFile {
        let file = NamedTempFile::new().expect("create temp image");
        file.as_file()
            .set_len(TOTAL_SECTORS as u64 * BYTES_PER_SECTOR as u64)
            .unwrap();

        let mut boot = [0u8; 512];
        boot[0x0B..0x0D].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
        boot[0x0D] = 1;
        boot[0x0E..0x10].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        boot[0x10] = FAT_COUNT as u8;
        boot[0x15] = 0xF8;
        boot[0x20..0x24].copy_from_slice(&TOTAL_SECTORS.to_le_bytes());
        boot[0x24..0x28].copy_from_slice(&SECTORS_PER_FAT.to_le_bytes());
        boot[0x2C..0x30].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
        boot[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
        file.as_file().write_at(&boot, 0).unwrap();

        set_fat_entry(file.as_file(), 0, 0x0FFF_FF00 | 0xF8);
        set_fat_entry(file.as_file(), 1, 0x0FFF_FFFF);
        set_fat_entry(file.as_file(), ROOT_CLUSTER, 0x0FFF_FFFF); // root: one cluster
        set_fat_entry(file.as_file(), 3, 0x0FFF_FFFF); // SUB: one cluster
        set_fat_entry(file.as_file(), 4, 0x0FFF_FFFF); // A.TXT: one cluster

        let mut root = [0u8; BYTES_PER_SECTOR as usize];
        root[0..32].copy_from_slice(&short_entry(b"SUB        ", 0x10, 3, 0));
        file.as_file().write_at(&root, cluster_offset(ROOT_CLUSTER)).unwrap();

        let mut sub = [0u8; BYTES_PER_SECTOR as usize];
        sub[0..32].copy_from_slice(&short_entry(b".          ", 0x10, 3, 0));
        sub[32..64].copy_from_slice(&short_entry(b"..         ", 0x10, ROOT_CLUSTER, 0));
        sub[64..96].copy_from_slice(&short_entry(b"A       TXT", 0x20, 4, 1));
        file.as_file().write_at(&sub, cluster_offset(3)).unwrap();

        file.as_file().write_at(b"x", cluster_offset(4)).unwrap();

        file
    }

    fn open_fs() -> Fat32Fs {
        let image = build_image();
        let volume = Volume::open(image.path(), 1000, 1000, 1_700_000_000).expect("open image");
        Fat32Fs::new(volume)
    }

    #[test]
    fn root_listing_has_single_dot_entries_and_debug_dir() {
        let fs = open_fs();
        let entries = fs.list_directory_entries(1, "/").unwrap();
        let dot_count = entries.iter().filter(|(name, ..)| name == ".").count();
        let dotdot_count = entries.iter().filter(|(name, ..)| name == "..").count();
        assert_eq!(dot_count, 1);
        assert_eq!(dotdot_count, 1);
        assert!(entries.iter().any(|(name, ..)| name == "SUB"));
        assert!(entries.iter().any(|(name, ..)| name == debug::DEBUG_DIR_NAME));
    }

    #[test]
    fn subdirectory_listing_does_not_duplicate_real_dot_entries() {
        let fs = open_fs();
        let entries = fs.list_directory_entries(3, "/SUB").unwrap();
        let dot_count = entries.iter().filter(|(name, ..)| name == ".").count();
        let dotdot_count = entries.iter().filter(|(name, ..)| name == "..").count();
        assert_eq!(dot_count, 1, "entries: {entries:?}");
        assert_eq!(dotdot_count, 1, "entries: {entries:?}");
        assert!(entries.iter().any(|(name, ..)| name == "A.TXT"));
    }
}
