//! The byte-range reader (spec.md §4.7): translates a `(start_cluster, file_size, offset, len)`
//! request into cluster-chain traversal and bounded copies.

use crate::device::Device;
use crate::error::Fat32Error;
use crate::fat::{FatWalker, Next};

/// Reads up to `buf.len()` bytes of file data starting at `offset` into `buf`, returning the
/// number of bytes actually written — always the true count, never a bug-for-bug `0` on the
/// truncated-chain path (see spec.md §9's open question about the original implementation).
pub fn read_bytes(
    fat: &FatWalker,
    device: &dyn Device,
    start_cluster: u32,
    file_size: u64,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize, Fat32Error> {
    if offset >= file_size {
        return Ok(0);
    }
    let to_read = ((file_size - offset).min(buf.len() as u64)) as usize;
    if to_read == 0 {
        return Ok(0);
    }

    let cluster_size = fat.cluster_size() as u64;
    let mut cluster = start_cluster;
    let mut skip = offset;

    while skip >= cluster_size {
        cluster = advance_or_fail(fat, start_cluster, cluster)?;
        skip -= cluster_size;
    }

    let mut written = 0usize;
    let mut within_cluster = skip;

    loop {
        let remaining = to_read - written;
        if remaining == 0 {
            break;
        }

        let take = ((cluster_size - within_cluster).min(remaining as u64)) as usize;
        let cluster_offset = fat.offset(cluster) + within_cluster;
        let bytes = device.read_at(cluster_offset, take)?;
        buf[written..written + take].copy_from_slice(&bytes);
        written += take;
        within_cluster = 0;

        if written == to_read {
            break;
        }

        match fat.next(cluster)? {
            Next::Cluster(next) => cluster = next,
            Next::EndOfChain => {
                log::warn!(
                    "cluster chain from {start_cluster} ended early: delivered {written} of {to_read} requested bytes"
                );
                break;
            }
            Next::Bad | Next::Free => {
                log::warn!(
                    "cluster chain from {start_cluster} hit a bad/free cluster; delivered {written} of {to_read} requested bytes"
                );
                break;
            }
        }
    }

    Ok(written)
}

fn advance_or_fail(fat: &FatWalker, start_cluster: u32, cluster: u32) -> Result<u32, Fat32Error> {
    match fat.next(cluster)? {
        Next::Cluster(next) => Ok(next),
        Next::EndOfChain => Err(Fat32Error::CorruptChain(format!(
            "chain from {start_cluster} ended before the requested offset"
        ))),
        Next::Bad => Err(Fat32Error::CorruptChain(format!(
            "chain from {start_cluster} hit a bad cluster before the requested offset"
        ))),
        Next::Free => Err(Fat32Error::CorruptChain(format!(
            "chain from {start_cluster} hit an unallocated cluster before the requested offset"
        ))),
    }
}
