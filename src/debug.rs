//! The synthetic `/.debug` directory (spec.md §9 "Open question: diagnostics").
//!
//! Nothing under `/.debug` exists on disk; it's fabricated by the FUSE adapter so an operator can
//! inspect the geometry the mount derived without a separate tool. Reserved inode numbers at the
//! top of the `u64` range keep it out of the way of real cluster numbers, which top out well below
//! `u32::MAX`.

use crate::bpb::Geometry;
use crate::volume::{FileKind, Stat};

pub const DEBUG_DIR_NAME: &str = ".debug";
pub const GEOMETRY_FILE_NAME: &str = "geometry";

pub const DEBUG_DIR_INODE: u64 = u64::MAX - 1;
pub const GEOMETRY_FILE_INODE: u64 = u64::MAX;

/// True for `/.debug` and everything under it.
pub fn is_debug_path(path: &str) -> bool {
    let trimmed = path.trim_start_matches('/');
    trimmed == DEBUG_DIR_NAME || trimmed.starts_with("/.debug/") || trimmed.starts_with(".debug/")
}

/// Renders the decoded boot-sector geometry as a flat `key: value` text dump.
pub fn render_geometry(geometry: &Geometry) -> String {
    format!(
        "bytes_per_sector: {}\n\
         sectors_per_cluster: {}\n\
         cluster_size: {}\n\
         reserved_sectors: {}\n\
         fat_count: {}\n\
         sectors_per_fat: {}\n\
         fat_region_offset: {}\n\
         backup_fat_offset: {}\n\
         data_region_start_sector: {}\n\
         total_sectors: {}\n\
         count_of_clusters: {}\n\
         root_cluster: {}\n\
         media_info: {:#04x}\n",
        geometry.bytes_per_sector,
        geometry.sectors_per_cluster,
        geometry.cluster_size,
        geometry.reserved_sectors,
        geometry.fat_count,
        geometry.sectors_per_fat,
        geometry.fat_region_offset,
        geometry.backup_fat_offset(),
        geometry.data_region_start_sector,
        geometry.total_sectors,
        geometry.count_of_clusters,
        geometry.root_cluster,
        geometry.media_info,
    )
}

pub fn dir_stat(uid: u32, gid: u32, mount_time: i64) -> Stat {
    Stat {
        inode: DEBUG_DIR_INODE,
        kind: FileKind::Directory,
        mode: (libc::S_IFDIR as u32) | 0o555,
        size: 0,
        nlink: 1,
        uid,
        gid,
        atime: mount_time,
        mtime: mount_time,
        ctime: mount_time,
    }
}

pub fn geometry_file_stat(uid: u32, gid: u32, mount_time: i64, contents_len: u64) -> Stat {
    Stat {
        inode: GEOMETRY_FILE_INODE,
        kind: FileKind::File,
        mode: (libc::S_IFREG as u32) | 0o444,
        size: contents_len,
        nlink: 1,
        uid,
        gid,
        atime: mount_time,
        mtime: mount_time,
        ctime: mount_time,
    }
}

/// The names `/.debug` contains. A `Vec` rather than a `const` slice since a future entry (e.g.
/// a FAT dump) would need the same shape.
pub fn entries() -> Vec<&'static str> {
    vec![GEOMETRY_FILE_NAME]
}
