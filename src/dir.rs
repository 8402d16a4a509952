//! The directory stream decoder (spec.md §4.4).
//!
//! Reads a directory's cluster chain one `cluster_size` block at a time, walks it in 32-byte
//! steps, and streams `(name, DecodedEntry)` pairs to a caller-supplied sink. The sink returns
//! [`ControlFlow`] so a caller like the path resolver can stop enumeration the moment it finds the
//! component it's looking for, without the decoder knowing anything about path resolution.

use std::ops::ControlFlow;

use crate::device::Device;
use crate::entry::{
    LfnAssembler, LfnSlot, ShortEntry, ATTR_LFN, DIR_ENTRY_SIZE, NAME_FREE_LAST, NAME_FREE_UNUSED,
};
use crate::error::Fat32Error;
use crate::fat::{FatWalker, Next};
use crate::name::decode_short_name;
use crate::time::decode_timestamp;

/// The fields of a directory entry a caller actually needs, independent of the short/long name
/// split that produced it.
#[derive(Debug, Clone, Copy)]
pub struct DecodedEntry {
    pub is_dir: bool,
    pub read_only: bool,
    pub size: u32,
    pub start_cluster: u32,
    pub ctime: i64,
    pub mtime: i64,
    pub atime: i64,
}

/// Streams the logical entries of the directory whose data starts at `start_cluster`.
///
/// `mount_time` substitutes for any all-zero on-disk date field (spec.md §4.9); it's threaded in
/// rather than read from a global clock so the decoder stays a pure function of its inputs.
pub fn read_dir(
    fat: &FatWalker,
    device: &dyn Device,
    start_cluster: u32,
    mount_time: i64,
    mut sink: impl FnMut(&str, DecodedEntry) -> ControlFlow<()>,
) -> Result<(), Fat32Error> {
    let mut assembler = LfnAssembler::new();
    let mut cluster = start_cluster;

    loop {
        let cluster_bytes = device.read_at(fat.offset(cluster), fat.cluster_size())?;

        for chunk in cluster_bytes.chunks_exact(DIR_ENTRY_SIZE) {
            let raw: [u8; DIR_ENTRY_SIZE] = chunk.try_into().unwrap();

            match raw[0] {
                NAME_FREE_LAST => return Ok(()),
                NAME_FREE_UNUSED => {
                    assembler.discard();
                    continue;
                }
                _ => {}
            }

            if raw[11] == ATTR_LFN {
                assembler.feed(LfnSlot::parse(&raw));
                continue;
            }

            let short = ShortEntry::parse(&raw);
            if short.is_volume_id() {
                assembler.discard();
                continue;
            }

            // "." and ".." are short entries with unusual, otherwise-illegal name bytes; a real
            // 8.3 name can never start with '.' (it's in the reserved-byte set), so seeing it
            // unambiguously identifies these two self/parent pointers.
            if short.raw_name[0] == b'.' {
                assembler.discard();
                let name = if short.raw_name[1] == b'.' { ".." } else { "." };
                let decoded = to_decoded_entry(&short, mount_time);
                if sink(name, decoded).is_break() {
                    return Ok(());
                }
                continue;
            }

            let name = match assembler.take_if_matches(&short.raw_name) {
                Some(long_name) => long_name,
                None => match decode_short_name(&short.raw_name) {
                    Ok(name) => name,
                    Err(e) => {
                        log::warn!("terminating directory stream at malformed entry: {e}");
                        return Ok(());
                    }
                },
            };

            let decoded = to_decoded_entry(&short, mount_time);
            if sink(&name, decoded).is_break() {
                return Ok(());
            }
        }

        match fat.next(cluster)? {
            Next::Cluster(next) => cluster = next,
            Next::EndOfChain => return Ok(()),
            Next::Bad => {
                return Err(Fat32Error::CorruptChain(format!(
                    "directory chain starting at {start_cluster} hit a bad cluster at {cluster}"
                )))
            }
            Next::Free => {
                return Err(Fat32Error::CorruptChain(format!(
                    "directory chain starting at {start_cluster} hit an unallocated cluster at {cluster}"
                )))
            }
        }
    }
}

fn to_decoded_entry(short: &ShortEntry, mount_time: i64) -> DecodedEntry {
    DecodedEntry {
        is_dir: short.is_directory(),
        read_only: short.is_read_only(),
        size: short.size,
        start_cluster: short.start_cluster,
        ctime: decode_timestamp(short.ctime_date, short.ctime_time, mount_time),
        mtime: decode_timestamp(short.mtime_date, short.mtime_time, mount_time),
        atime: decode_timestamp(short.adate, 0, mount_time),
    }
}
