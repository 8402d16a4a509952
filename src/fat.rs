//! The FAT walker: cluster-chain traversal backed by the file allocation table.
//!
//! A FAT32 entry is a 32-bit little-endian value but only the low 28 bits are meaningful — the top
//! 4 bits are reserved and must be ignored on read (spec.md §3 "Cluster number"). Every lookup is
//! cross-checked against the first backup FAT; a mismatch is a `CORRUPT_FAT` rather than a silent
//! pick of one copy over the other, since there's no way to know from the data alone which mirror is
//! stale.

use std::sync::Arc;

use lru::LruCache;
use spin::Mutex;

use crate::bpb::Geometry;
use crate::device::Device;
use crate::error::Fat32Error;

const FREE_CLUSTER: u32 = 0x0000_0000;
const BAD_CLUSTER: u32 = 0x0FFF_FFF7;
const END_OF_CHAIN_LO: u32 = 0x0FFF_FFF8;
const END_OF_CHAIN_HI: u32 = 0x0FFF_FFFF;
const CLUSTER_MASK: u32 = 0x0FFF_FFFF;

/// How the FAT classifies the entry for a given cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Cluster(u32),
    EndOfChain,
    Bad,
    Free,
}

/// How many FAT blocks to memoize. Bounded and explicitly not assumed valid across mounts — see
/// spec.md §5 and the SPEC_FULL.md concurrency supplement.
const FAT_BLOCK_CACHE_SIZE: usize = 8;
const FAT_READ_CHUNK: usize = 512;

pub struct FatWalker {
    device: Arc<dyn Device>,
    geometry: Geometry,
    // Cache key: (fat-relative block index) -> raw bytes of that chunk of the primary FAT.
    cache: Mutex<LruCache<u64, Vec<u8>>>,
}

impl FatWalker {
    pub fn new(device: Arc<dyn Device>, geometry: Geometry) -> Self {
        Self {
            device,
            geometry,
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(FAT_BLOCK_CACHE_SIZE).unwrap(),
            )),
        }
    }

    /// Reads a 32-bit little-endian FAT entry at `offset` from the start of the device, going
    /// through the small block memoization cache.
    fn read_entry(&self, offset: u64) -> Result<u32, Fat32Error> {
        let chunk_index = offset / FAT_READ_CHUNK as u64;
        let chunk_offset = chunk_index * FAT_READ_CHUNK as u64;
        let within = (offset - chunk_offset) as usize;

        let mut cache = self.cache.lock();
        if let Some(chunk) = cache.get(&chunk_index) {
            return Ok(u32::from_le_bytes(
                chunk[within..within + 4].try_into().unwrap(),
            ));
        }
        drop(cache);

        let chunk = self.device.read_at(chunk_offset, FAT_READ_CHUNK)?;
        let value = u32::from_le_bytes(chunk[within..within + 4].try_into().unwrap());
        self.cache.lock().put(chunk_index, chunk);
        Ok(value)
    }

    /// Reads the low byte of FAT entry 0, used by boot-sector validation to cross-check
    /// `media_info` before `Geometry` even exists. Does not go through the block cache since it
    /// runs once, before the geometry (and thus `fat_region_offset`) is known to be trustworthy.
    pub fn read_fat_entry_zero_low_byte(
        device: &dyn Device,
        fat_region_offset: u64,
    ) -> Result<u8, Fat32Error> {
        let bytes = device.read_at(fat_region_offset, 4)?;
        Ok(bytes[0])
    }

    /// Classifies the next cluster after `c`, cross-checking the primary FAT against the first
    /// backup FAT (spec.md §4.3).
    pub fn next(&self, cluster: u32) -> Result<Next, Fat32Error> {
        let primary_offset = self.geometry.fat_region_offset + cluster as u64 * 4;
        let backup_offset = self.geometry.backup_fat_offset() + cluster as u64 * 4;

        let primary = self.read_entry(primary_offset)? & CLUSTER_MASK;
        let backup_raw = self.device.read_at(backup_offset, 4)?;
        let backup = u32::from_le_bytes(backup_raw.try_into().unwrap()) & CLUSTER_MASK;

        if primary != backup {
            return Err(Fat32Error::CorruptFat {
                cluster,
                primary,
                backup,
            });
        }

        Ok(classify(primary))
    }

    /// Byte offset of the first sector of cluster `c`. Thin pass-through to [`Geometry`], kept
    /// here too since every caller of the FAT walker needs it in the same breath as `next`.
    pub fn offset(&self, cluster: u32) -> u64 {
        self.geometry.cluster_offset(cluster)
    }

    pub fn cluster_size(&self) -> usize {
        self.geometry.cluster_size as usize
    }

    /// Walks a full cluster chain starting at `start`, returning its length. Used to compute a
    /// directory's byte size (directories have no on-disk size field — spec.md §9).
    pub fn chain_length(&self, start: u32) -> Result<u64, Fat32Error> {
        let mut len = 0u64;
        let mut cluster = start;
        loop {
            len += 1;
            match self.next(cluster)? {
                Next::Cluster(next) => cluster = next,
                Next::EndOfChain => break,
                Next::Bad => {
                    return Err(Fat32Error::CorruptChain(format!(
                        "chain starting at {start} hit a bad cluster at {cluster}"
                    )))
                }
                Next::Free => {
                    return Err(Fat32Error::CorruptChain(format!(
                        "chain starting at {start} hit an unallocated cluster at {cluster}"
                    )))
                }
            }
        }
        Ok(len)
    }
}

fn classify(masked: u32) -> Next {
    match masked {
        FREE_CLUSTER => Next::Free,
        BAD_CLUSTER => Next::Bad,
        END_OF_CHAIN_LO..=END_OF_CHAIN_HI => Next::EndOfChain,
        other => Next::Cluster(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_ignores_top_nibble() {
        assert_eq!(classify(0x1FFF_FFFF & CLUSTER_MASK), classify(0x0FFF_FFFF));
    }

    #[test]
    fn sentinels_classify_correctly() {
        assert_eq!(classify(0), Next::Free);
        assert_eq!(classify(0x0FFF_FFF7), Next::Bad);
        assert_eq!(classify(0x0FFF_FFF8), Next::EndOfChain);
        assert_eq!(classify(0x0FFF_FFFF), Next::EndOfChain);
        assert_eq!(classify(5), Next::Cluster(5));
    }
}
