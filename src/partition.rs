//! Partition and ownership functions.
//!
//! Ownership is never stored: every coordination cycle recomputes it from
//! the live instance set with a modulo check. There is no assignment table
//! to go stale and no rebalance protocol — when an instance joins or dies,
//! the next cycle's arithmetic redistributes the partitions.

/// Default number of virtual partitions streams are hashed into.
pub const DEFAULT_PARTITION_COUNT: u32 = 10_000;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable 64-bit FNV-1a hash of a stream id.
///
/// Std's `DefaultHasher` is not guaranteed stable across processes or
/// releases; partition placement must be, since every instance computes it
/// independently.
pub fn stable_hash(stream_id: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in stream_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Partition a stream id into one of `partition_count` buckets.
pub fn partition_for(stream_id: &str, partition_count: u32) -> u32 {
    debug_assert!(partition_count > 0);
    (stable_hash(stream_id) % u64::from(partition_count.max(1))) as u32
}

/// Rank of an instance within the active set: its index in the
/// ascending-sorted id list. Returns `None` if the id is not active.
pub fn rank_of(instance_id: &str, active_ids: &[String]) -> Option<usize> {
    let mut sorted: Vec<&str> = active_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.iter().position(|id| *id == instance_id)
}

/// Whether the instance with the given rank owns a partition.
pub fn owns(partition: u32, active_count: usize, rank: usize) -> bool {
    if active_count == 0 {
        return false;
    }
    partition as usize % active_count == rank
}
