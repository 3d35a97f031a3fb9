//! File naming and key partitioning shared by map workers and the coordinator.
//!
//! Map task `m` writes the records of partition `r` to `mr-temp-<m>-<r>`;
//! the coordinator recovers `r` from that name alone when the map task
//! reports. Reduce task `r` publishes `mr-out-<r>`.

use std::hash::Hasher;
use std::path::Path;

const INTERMEDIATE_PREFIX: &str = "mr-temp-";
const OUTPUT_PREFIX: &str = "mr-out-";

/// FNV-1a over the key bytes, masked to 31 bits.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}

pub fn partition_for(key: &str, reduce_count: usize) -> usize {
    ihash(key) as usize % reduce_count
}

pub fn intermediate_name(map_task_id: usize, partition: usize) -> String {
    format!("{}{}-{}", INTERMEDIATE_PREFIX, map_task_id, partition)
}

pub fn output_name(reduce_task_id: usize) -> String {
    format!("{}{}", OUTPUT_PREFIX, reduce_task_id)
}

/// Extracts `(map_task_id, partition)` from an intermediate file path.
pub fn parse_intermediate(path: &str) -> Option<(usize, usize)> {
    let name = Path::new(path).file_name()?.to_str()?;
    let (map_id, partition) = name.strip_prefix(INTERMEDIATE_PREFIX)?.split_once('-')?;
    Some((map_id.parse().ok()?, partition.parse().ok()?))
}
