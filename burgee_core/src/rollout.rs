//! Deterministic hash-and-bucket rollout.
//!
//! This module is the cross-implementation contract: every SDK and server that evaluates the
//! same flag data must produce bit-identical decisions. It is deliberately dependency-free
//! (including the CRC-32, which is spelled out here rather than pulled in) so the algorithm can
//! be ported line-for-line. The unit tests pin independently computed vectors; the files under
//! `test-data/` exercise it end to end.

/// Number of buckets entities are hashed into. One bucket is 0.1% of a rollout.
pub const TOTAL_BUCKETS: u32 = 1000;

const CRC_INIT: u32 = 0xFFFF_FFFF;
const CRC_POLY: u32 = 0xEDB8_8320;

fn crc32_feed(mut crc: u32, bytes: &[u8]) -> u32 {
    for &byte in bytes {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC_POLY
            } else {
                crc >> 1
            };
        }
    }
    crc
}

/// Reflected CRC-32 (polynomial `0xEDB88320`, init and final XOR `0xFFFFFFFF`).
///
/// Reference vector: `crc32(b"123456789") == 0xCBF43926`.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32_feed(CRC_INIT, bytes) ^ CRC_INIT
}

/// Hash `salt ++ entity_id` into a bucket in `0..TOTAL_BUCKETS`.
///
/// The salt is the flag id rendered in decimal, which makes bucket positions independent across
/// flags: an entity in the first 10% of one flag is not biased into the first 10% of another.
pub fn bucket(entity_id: &str, salt: &str) -> u32 {
    let crc = crc32_feed(crc32_feed(CRC_INIT, salt.as_bytes()), entity_id.as_bytes()) ^ CRC_INIT;
    crc % TOTAL_BUCKETS
}

/// Decide whether `entity_id` receives a variant, and which one.
///
/// `percents_accumulated[i]` is the inclusive one-indexed upper bucket bound for
/// `variant_ids[i]`, as produced by
/// [`Segment::distribution_table`](crate::Segment::distribution_table).
///
/// Returns the selected variant id (or `None`) together with a human-readable debug message.
/// The message strings are part of the contract: debug logs must read the same from every
/// implementation.
pub fn rollout(
    entity_id: &str,
    salt: &str,
    rollout_percent: i32,
    variant_ids: &[i64],
    percents_accumulated: &[i32],
) -> (Option<i64>, String) {
    if entity_id.is_empty() {
        return (None, "rollout no. empty entityID".to_owned());
    }
    if rollout_percent <= 0 {
        return (
            None,
            format!("rollout no. invalid rolloutPercent: {rollout_percent}"),
        );
    }
    if variant_ids.is_empty() || percents_accumulated.is_empty() {
        return (None, "rollout no. there's no distribution set".to_owned());
    }

    // One-indexed bucket in 1..=1000 so it compares directly against accumulated percents.
    let bucket_num = (bucket(entity_id, salt) + 1) as i32;

    if rollout_percent < 100 && bucket_num > rollout_percent * 10 {
        return (
            None,
            format!("rollout no. entityID bucket: {bucket_num} rolloutPercent: {rollout_percent}"),
        );
    }

    // Smallest index whose accumulated percent covers the bucket; clamped to the last entry
    // when the accumulated total does not reach the bucket.
    let index = match percents_accumulated.binary_search(&bucket_num) {
        Ok(i) => i,
        Err(i) => i.min(percents_accumulated.len() - 1),
    };
    let variant_id = variant_ids[index];

    (
        Some(variant_id),
        format!(
            "rollout yes. BucketNum: {bucket_num}, VariantID: {variant_id}, RolloutPercent: {rollout_percent}"
        ),
    )
}
