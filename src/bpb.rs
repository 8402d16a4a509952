//! Boot sector (BPB) decoding and derived volume geometry.
//!
//! The first 512 bytes of a FAT32 volume hold the boot sector: a jump instruction, an OEM name, the
//! BIOS Parameter Block proper, and the FAT32-specific extension fields (root cluster, FSInfo
//! sector, backup boot sector). Every multi-byte field is little-endian on disk regardless of host
//! byte order, so every field here is read with an explicit little-endian accessor rather than
//! overlaid with a `#[repr(packed)]` struct — see the "packed on-disk records" design note: a
//! structure overlay bakes in host-specific alignment and endianness assumptions that don't survive
//! a port to a big-endian host.
//!
//! Layout (offsets from the start of the boot sector):
//!
//! | Offset | Size | Field                 |
//! |-------:|-----:|------------------------|
//! |   0x0B |    2 | bytes_per_sector       |
//! |   0x0D |    1 | sectors_per_cluster    |
//! |   0x0E |    2 | reserved_sectors       |
//! |   0x10 |    1 | fat_count              |
//! |   0x11 |    2 | root_max_entries       |
//! |   0x13 |    2 | total_sectors_small    |
//! |   0x15 |    1 | media_info             |
//! |   0x16 |    2 | sectors_per_fat_small  |
//! |   0x20 |    4 | total_sectors          |
//! |   0x24 |    4 | sectors_per_fat        |
//! |   0x2C |    4 | root_cluster           |
//! |  0x1FE |    2 | boot signature (0x55AA)|

use crate::error::Fat32Error;

const BOOT_SECTOR_LEN: usize = 512;
const BOOT_SIGNATURE: u16 = 0xAA55;
const MIN_FAT32_CLUSTERS: u64 = 65_525;

fn le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Immutable volume geometry, derived once at mount and read-only for the life of the process
/// (spec.md §3 invariant).
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub sectors_per_fat: u32,
    pub total_sectors: u64,
    pub root_cluster: u32,
    pub media_info: u8,

    pub cluster_size: u32,
    pub fat_region_offset: u64,
    pub data_region_start_sector: u64,
    pub count_of_clusters: u64,
}

impl Geometry {
    /// Parses and validates the 512-byte boot sector, enforcing every constraint in spec.md §3 and
    /// §4.2. `fat_entry_zero_low_byte` is a byte read from the low byte of FAT entry 0 by the
    /// caller (the FAT walker owns that read); geometry decoding doesn't reach back into the FAT.
    pub fn decode(boot_sector: &[u8], fat_entry_zero_low_byte: u8) -> Result<Self, Fat32Error> {
        if boot_sector.len() < BOOT_SECTOR_LEN {
            return Err(Fat32Error::NotFat32(format!(
                "boot sector too short: {} bytes",
                boot_sector.len()
            )));
        }

        let signature = le_u16(boot_sector, 510);
        if signature != BOOT_SIGNATURE {
            return Err(Fat32Error::NotFat32(format!(
                "bad boot signature {signature:#06x}"
            )));
        }

        let bytes_per_sector = le_u16(boot_sector, 0x0B) as u32;
        if !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return Err(Fat32Error::NotFat32(format!(
                "implausible bytes_per_sector {bytes_per_sector}"
            )));
        }

        let sectors_per_cluster = boot_sector[0x0D] as u32;
        if !sectors_per_cluster.is_power_of_two() {
            return Err(Fat32Error::NotFat32(format!(
                "sectors_per_cluster {sectors_per_cluster} is not a power of two"
            )));
        }
        if bytes_per_sector * sectors_per_cluster > 32_768 {
            return Err(Fat32Error::NotFat32(
                "cluster size exceeds 32KiB".to_string(),
            ));
        }

        let reserved_sectors = le_u16(boot_sector, 0x0E) as u32;
        if reserved_sectors == 0 {
            return Err(Fat32Error::NotFat32("reserved_sectors is zero".to_string()));
        }

        let fat_count = boot_sector[0x10] as u32;
        if fat_count < 2 {
            return Err(Fat32Error::NotFat32(format!("fat_count {fat_count} < 2")));
        }

        let root_max_entries = le_u16(boot_sector, 0x11);
        let total_sectors_small = le_u16(boot_sector, 0x13);
        let media_info = boot_sector[0x15];
        let sectors_per_fat_small = le_u16(boot_sector, 0x16);
        let total_sectors_large = le_u32(boot_sector, 0x20);
        let sectors_per_fat = le_u32(boot_sector, 0x24);
        let root_cluster = le_u32(boot_sector, 0x2C);

        if root_max_entries != 0 {
            return Err(Fat32Error::NotFat32(
                "root_max_entries must be 0 on FAT32".to_string(),
            ));
        }
        if total_sectors_small != 0 {
            return Err(Fat32Error::NotFat32(
                "total_sectors_small must be 0 on FAT32".to_string(),
            ));
        }
        if sectors_per_fat_small != 0 {
            return Err(Fat32Error::NotFat32(
                "16-bit sectors_per_fat must be 0 on FAT32".to_string(),
            ));
        }
        if sectors_per_fat == 0 {
            return Err(Fat32Error::NotFat32("sectors_per_fat is zero".to_string()));
        }
        if total_sectors_large == 0 {
            return Err(Fat32Error::NotFat32(
                "total_sectors (32-bit) must be non-zero on FAT32".to_string(),
            ));
        }
        let total_sectors = total_sectors_large as u64;

        let cluster_size = bytes_per_sector * sectors_per_cluster;
        let fat_region_offset = reserved_sectors as u64 * bytes_per_sector as u64;
        let data_region_start_sector =
            reserved_sectors as u64 + fat_count as u64 * sectors_per_fat as u64;

        if total_sectors <= data_region_start_sector {
            return Err(Fat32Error::NotFat32(
                "total_sectors does not leave room for a data region".to_string(),
            ));
        }
        let count_of_clusters =
            (total_sectors - data_region_start_sector) / sectors_per_cluster as u64;

        if count_of_clusters < MIN_FAT32_CLUSTERS {
            return Err(Fat32Error::NotFat32(format!(
                "count_of_clusters {count_of_clusters} < {MIN_FAT32_CLUSTERS}; this is a FAT12/16 volume"
            )));
        }

        if media_info != fat_entry_zero_low_byte {
            return Err(Fat32Error::CorruptChain(format!(
                "media_info {media_info:#04x} does not match FAT[0] low byte {fat_entry_zero_low_byte:#04x}"
            )));
        }

        if root_cluster < 2 {
            return Err(Fat32Error::NotFat32(format!(
                "root_cluster {root_cluster} is not a valid data cluster"
            )));
        }

        Ok(Geometry {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            sectors_per_fat,
            total_sectors,
            root_cluster,
            media_info,
            cluster_size,
            fat_region_offset,
            data_region_start_sector,
            count_of_clusters,
        })
    }

    /// Byte offset of the first sector of cluster `c`, for `c >= 2`.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        assert!(cluster >= 2, "cluster_offset is undefined below cluster 2");
        (self.data_region_start_sector + (cluster as u64 - 2) * self.sectors_per_cluster as u64)
            * self.bytes_per_sector as u64
    }

    /// Byte offset of the backup (first mirror) FAT, used for the FAT walker's cross-check.
    pub fn backup_fat_offset(&self) -> u64 {
        self.fat_region_offset + self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }
}
