//! Bucketed nearest-neighbor index over the fingerprint space.
//!
//! A full scan per query stops scaling past a few tens of thousands of
//! frames (full seasons), so the 64-bit space is partitioned by the leading
//! `k` bits of each fingerprint. A near lookup probes the exact bucket plus
//! every bucket whose prefix differs in at most `max_distance` bit
//! positions, then verifies true Hamming distance inside each candidate
//! bucket. This trades a controlled false-negative risk (a match whose
//! differing bits fall mostly outside the prefix) for sub-linear average
//! lookups; see [`crate::AnalysisConfig`] for the `max_distance <
//! bucket_bits` coupling.

use crate::models::{EpisodeId, Fingerprint, FrameRecord};
use crate::{Error, Result};
use std::collections::HashMap;

/// In-memory bucket index of frame records.
///
/// Keys are the leading `bucket_bits` bits of each fingerprint. The index
/// is rebuilt from the durable `frame_hashes` table at store open and kept
/// in sync by the store's write path; it never touches disk itself.
#[derive(Debug)]
pub struct BucketIndex {
    /// Number of leading fingerprint bits forming the bucket key.
    bucket_bits: u32,
    /// Records filed by their fingerprint prefix.
    buckets: HashMap<u32, Vec<FrameRecord>>,
    /// Total record count across all buckets.
    len: usize,
}

impl BucketIndex {
    /// Creates an empty index partitioned on the leading `bucket_bits` bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `bucket_bits` is outside `1..=32`.
    pub fn new(bucket_bits: u32) -> Result<Self> {
        if !(1..=32).contains(&bucket_bits) {
            return Err(Error::InvalidInput(format!(
                "bucket_bits ({bucket_bits}) must be in 1..=32"
            )));
        }
        Ok(Self {
            bucket_bits,
            buckets: HashMap::new(),
            len: 0,
        })
    }

    /// Returns the configured bucket width in bits.
    #[must_use]
    pub const fn bucket_bits(&self) -> u32 {
        self.bucket_bits
    }

    /// Returns the total number of indexed records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the index holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Files a record under its fingerprint's bucket.
    pub fn insert(&mut self, record: FrameRecord) {
        let key = record.fingerprint.prefix(self.bucket_bits);
        self.buckets.entry(key).or_default().push(record);
        self.len += 1;
    }

    /// Removes every record belonging to `episode_id`.
    ///
    /// Idempotent; returns the number of records removed.
    pub fn remove_episode(&mut self, episode_id: EpisodeId) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, records| {
            let before = records.len();
            records.retain(|r| r.episode_id != episode_id);
            removed += before - records.len();
            !records.is_empty()
        });
        self.len -= removed;
        removed
    }

    /// Returns records whose fingerprint equals `fingerprint` exactly,
    /// excluding `exclude` (the episode under analysis).
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCorruption`] if the probed bucket holds a
    /// record filed under the wrong prefix.
    pub fn exact_lookup(
        &self,
        fingerprint: Fingerprint,
        exclude: EpisodeId,
    ) -> Result<Vec<FrameRecord>> {
        let key = fingerprint.prefix(self.bucket_bits);
        let Some(records) = self.buckets.get(&key) else {
            return Ok(Vec::new());
        };
        let mut hits = Vec::new();
        for record in records {
            self.check_bucket_integrity(key, record)?;
            if record.episode_id != exclude && record.fingerprint == fingerprint {
                hits.push(*record);
            }
        }
        hits.sort_by_key(|r| (r.episode_id, r.timestamp_ms));
        Ok(hits)
    }

    /// Returns records within `max_distance` Hamming distance of
    /// `fingerprint`, excluding `exclude`, as `(record, distance)` pairs
    /// ordered by `(distance, episode_id, timestamp_ms)`.
    ///
    /// An empty corpus (no other episodes stored) yields an empty list,
    /// never an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCorruption`] if a probed bucket holds a record
    /// filed under the wrong prefix.
    pub fn near_lookup(
        &self,
        fingerprint: Fingerprint,
        max_distance: u32,
        exclude: EpisodeId,
    ) -> Result<Vec<(FrameRecord, u32)>> {
        let base = fingerprint.prefix(self.bucket_bits);
        let radius = max_distance.min(self.bucket_bits);

        let mut hits = Vec::new();
        // When the bit-flip enumeration would outnumber the occupied
        // buckets, scanning the occupied buckets with a prefix-distance
        // filter is the cheaper probe order.
        if probe_count(self.bucket_bits, radius) > self.buckets.len() as u64 {
            for (&key, records) in &self.buckets {
                if (key ^ base).count_ones() <= radius {
                    self.scan_bucket(key, records, fingerprint, max_distance, exclude, &mut hits)?;
                }
            }
        } else {
            for key in keys_within(base, self.bucket_bits, radius) {
                if let Some(records) = self.buckets.get(&key) {
                    self.scan_bucket(key, records, fingerprint, max_distance, exclude, &mut hits)?;
                }
            }
        }

        hits.sort_by_key(|(r, d)| (*d, r.episode_id, r.timestamp_ms));
        Ok(hits)
    }

    /// Verifies distance inside one candidate bucket.
    fn scan_bucket(
        &self,
        key: u32,
        records: &[FrameRecord],
        fingerprint: Fingerprint,
        max_distance: u32,
        exclude: EpisodeId,
        hits: &mut Vec<(FrameRecord, u32)>,
    ) -> Result<()> {
        for record in records {
            self.check_bucket_integrity(key, record)?;
            if record.episode_id == exclude {
                continue;
            }
            let distance = fingerprint.distance(record.fingerprint);
            if distance <= max_distance {
                hits.push((*record, distance));
            }
        }
        Ok(())
    }

    /// A record filed under a bucket must carry that bucket's prefix.
    fn check_bucket_integrity(&self, key: u32, record: &FrameRecord) -> Result<()> {
        let actual = record.fingerprint.prefix(self.bucket_bits);
        if actual != key {
            return Err(Error::IndexCorruption {
                detail: format!(
                    "record ep{}@{}ms (fingerprint {}) filed under bucket {key:#x}, \
                     expected {actual:#x}",
                    record.episode_id, record.timestamp_ms, record.fingerprint
                ),
            });
        }
        Ok(())
    }
}

/// Number of bucket keys within `radius` bit flips of a `bits`-bit key.
///
/// `sum(C(bits, i) for i in 0..=radius)`, saturating.
fn probe_count(bits: u32, radius: u32) -> u64 {
    let mut total: u64 = 0;
    let mut choose: u64 = 1; // C(bits, 0)
    for i in 0..=radius.min(bits) {
        total = total.saturating_add(choose);
        // C(bits, i+1) = C(bits, i) * (bits - i) / (i + 1)
        choose = choose
            .saturating_mul(u64::from(bits - i))
            .checked_div(u64::from(i + 1))
            .unwrap_or(u64::MAX);
    }
    total
}

/// Enumerates every `bits`-bit key within `radius` bit flips of `base`,
/// including `base` itself. Each key appears exactly once.
fn keys_within(base: u32, bits: u32, radius: u32) -> Vec<u32> {
    let mut keys = Vec::new();
    keys.push(base);
    if radius > 0 {
        flip_combinations(base, bits, 0, radius, &mut keys);
    }
    keys
}

/// Pushes all keys reachable by flipping 1..=`remaining` bits of `key`,
/// restricted to bit positions `start..bits` so combinations are visited
/// once.
fn flip_combinations(key: u32, bits: u32, start: u32, remaining: u32, keys: &mut Vec<u32>) {
    for bit in start..bits {
        let flipped = key ^ (1 << bit);
        keys.push(flipped);
        if remaining > 1 {
            flip_combinations(flipped, bits, bit + 1, remaining - 1, keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(episode: i64, timestamp_ms: u64, bits: u64) -> FrameRecord {
        FrameRecord::new(EpisodeId::new(episode), timestamp_ms, Fingerprint::new(bits))
    }

    #[test]
    fn test_rejects_bad_bucket_bits() {
        assert!(BucketIndex::new(0).is_err());
        assert!(BucketIndex::new(33).is_err());
        assert!(BucketIndex::new(16).is_ok());
    }

    #[test]
    fn test_exact_lookup_excludes_episode() {
        let mut index = BucketIndex::new(16).unwrap();
        index.insert(record(1, 9000, 0xAAAA_0000_0000_0000));
        index.insert(record(2, 100, 0xAAAA_0000_0000_0000));

        let hits = index
            .exact_lookup(Fingerprint::new(0xAAAA_0000_0000_0000), EpisodeId::new(2))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].episode_id, EpisodeId::new(1));
    }

    #[test]
    fn test_exact_lookup_empty_corpus() {
        let index = BucketIndex::new(16).unwrap();
        let hits = index
            .exact_lookup(Fingerprint::new(0xFF), EpisodeId::new(1))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_near_lookup_finds_prefix_flip() {
        let mut index = BucketIndex::new(16).unwrap();
        // Differs from the query in one prefix bit.
        index.insert(record(1, 9000, 0xFF01_0000_0000_0000));

        let hits = index
            .near_lookup(Fingerprint::new(0xFF00_0000_0000_0000), 8, EpisodeId::new(2))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 1);
    }

    #[test]
    fn test_near_lookup_finds_suffix_flip() {
        let mut index = BucketIndex::new(16).unwrap();
        // Same bucket, differs in trailing bits only.
        index.insert(record(1, 9000, 0xFF00_0000_0000_0003));

        let hits = index
            .near_lookup(Fingerprint::new(0xFF00_0000_0000_0000), 8, EpisodeId::new(2))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 2);
    }

    #[test]
    fn test_near_lookup_threshold_boundary() {
        let mut index = BucketIndex::new(16).unwrap();
        // Exactly at distance 8 (suffix bits).
        index.insert(record(1, 0, 0xFF00_0000_0000_00FF));
        // Distance 9.
        index.insert(record(1, 1000, 0xFF00_0000_0000_01FF));

        let hits = index
            .near_lookup(Fingerprint::new(0xFF00_0000_0000_0000), 8, EpisodeId::new(2))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 8);
    }

    #[test]
    fn test_near_lookup_at_bucket_width_boundary() {
        // All 16 prefix bits differ: distance == bucket_bits. Still found
        // because the probe radius reaches the whole prefix at that point.
        let mut index = BucketIndex::new(16).unwrap();
        index.insert(record(1, 0, 0x0000_0000_0000_0000));

        let hits = index
            .near_lookup(Fingerprint::new(0xFFFF_0000_0000_0000), 16, EpisodeId::new(2))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 16);
    }

    #[test]
    fn test_near_lookup_zero_distance_is_exact() {
        let mut index = BucketIndex::new(16).unwrap();
        index.insert(record(1, 0, 0xAB));
        index.insert(record(1, 1000, 0xAF));

        let hits = index
            .near_lookup(Fingerprint::new(0xAB), 0, EpisodeId::new(2))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.timestamp_ms, 0);
    }

    #[test]
    fn test_near_lookup_ordered_by_distance() {
        let mut index = BucketIndex::new(16).unwrap();
        index.insert(record(1, 5000, 0b0111)); // distance 3 from 0
        index.insert(record(1, 1000, 0b0001)); // distance 1
        index.insert(record(1, 3000, 0b0011)); // distance 2

        let hits = index
            .near_lookup(Fingerprint::new(0), 8, EpisodeId::new(2))
            .unwrap();
        let distances: Vec<u32> = hits.iter().map(|(_, d)| *d).collect();
        assert_eq!(distances, vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_episode_idempotent() {
        let mut index = BucketIndex::new(16).unwrap();
        index.insert(record(1, 0, 0xAA));
        index.insert(record(1, 1000, 0xBB));
        index.insert(record(2, 0, 0xCC));

        assert_eq!(index.remove_episode(EpisodeId::new(1)), 2);
        assert_eq!(index.remove_episode(EpisodeId::new(1)), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_keys_within_counts() {
        // radius 0: just the base key
        assert_eq!(keys_within(0b1010, 4, 0), vec![0b1010]);
        // radius 1 over 4 bits: base + 4 single flips
        assert_eq!(keys_within(0, 4, 1).len(), 5);
        // radius 2 over 4 bits: 1 + 4 + 6
        assert_eq!(keys_within(0, 4, 2).len(), 11);
    }

    #[test]
    fn test_keys_within_unique_and_in_radius() {
        let keys = keys_within(0b1100, 8, 3);
        let unique: HashSet<u32> = keys.iter().copied().collect();
        assert_eq!(unique.len(), keys.len());
        assert!(keys.iter().all(|k| (k ^ 0b1100).count_ones() <= 3));
    }

    #[test]
    fn test_probe_count() {
        assert_eq!(probe_count(16, 0), 1);
        assert_eq!(probe_count(16, 1), 17);
        assert_eq!(probe_count(16, 2), 1 + 16 + 120);
        assert_eq!(probe_count(4, 4), 16);
    }

    #[test]
    fn test_fallback_scan_matches_enumeration() {
        // A sparse index forces the occupied-bucket fallback for large
        // radii; both probe orders must return the same hit set.
        let mut index = BucketIndex::new(16).unwrap();
        for i in 0..10u64 {
            index.insert(record(1, i * 1000, i << 48));
        }

        let query = Fingerprint::new(3 << 48);
        let wide = index.near_lookup(query, 8, EpisodeId::new(2)).unwrap();
        let narrow = index.near_lookup(query, 2, EpisodeId::new(2)).unwrap();
        for (record, distance) in &narrow {
            assert!(wide.iter().any(|(r, d)| r == record && d == distance));
        }
    }

    #[test]
    fn test_corrupted_bucket_fails_loudly() {
        let mut index = BucketIndex::new(16).unwrap();
        index.insert(record(1, 0, 0xAAAA_0000_0000_0000));
        // Misfile a record by hand.
        index
            .buckets
            .get_mut(&0xAAAA)
            .unwrap()
            .push(record(1, 1000, 0xBBBB_0000_0000_0000));

        let err = index
            .exact_lookup(Fingerprint::new(0xAAAA_0000_0000_0000), EpisodeId::new(2))
            .unwrap_err();
        assert!(matches!(err, Error::IndexCorruption { .. }));
    }
}
