//! Storage layer.
//!
//! Two durable tables back the engine, both in `SQLite`:
//! - `frame_hashes`: the authoritative per-frame fingerprint store, paired
//!   with an in-memory [`crate::index::BucketIndex`] for lookups
//! - `skip_segments`: the fused per-episode skip decisions

mod hash_store;
mod segment_store;
pub(crate) mod sqlite;

pub use hash_store::SqliteHashStore;
pub use segment_store::SqliteSegmentStore;

use crate::models::{EpisodeId, Fingerprint, FrameRecord, SkipSegment};
use crate::Result;

/// Trait for the durable frame-fingerprint store.
///
/// The store exclusively owns the persisted frame records. Batch writes
/// for one episode are atomic and mutually exclusive with each other;
/// lookups may run concurrently with writes for other episodes, and a
/// lookup excluding episode X is unaffected by concurrent writes to X.
pub trait HashStore: Send + Sync {
    /// Appends all records for one episode in input order, atomically.
    ///
    /// Returns the number of records stored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DuplicateEpisodeData`] if the episode
    /// already has stored hashes; callers delete-then-insert to reanalyze.
    fn add_batch(&self, episode_id: EpisodeId, frames: &[(u64, Fingerprint)]) -> Result<usize>;

    /// Returns the stored frames for an episode, ordered by timestamp.
    fn frames_for_episode(&self, episode_id: EpisodeId) -> Result<Vec<FrameRecord>>;

    /// Returns records whose fingerprint equals the query exactly, from
    /// episodes other than `exclude`.
    fn exact_lookup(&self, fingerprint: Fingerprint, exclude: EpisodeId)
    -> Result<Vec<FrameRecord>>;

    /// Returns records within `max_distance` Hamming distance of the
    /// query, from episodes other than `exclude`, with their distances.
    ///
    /// An index with zero other episodes yields an empty list.
    fn near_lookup(
        &self,
        fingerprint: Fingerprint,
        max_distance: u32,
        exclude: EpisodeId,
    ) -> Result<Vec<(FrameRecord, u32)>>;

    /// Removes all records for an episode. Idempotent; returns the number
    /// of records removed.
    fn delete_episode(&self, episode_id: EpisodeId) -> Result<usize>;

    /// Checks whether an episode has stored hashes.
    fn has_episode(&self, episode_id: EpisodeId) -> Result<bool> {
        Ok(!self.frames_for_episode(episode_id)?.is_empty())
    }
}

/// Trait for the durable skip-segment store.
pub trait SegmentStore: Send + Sync {
    /// Replaces an episode's segments with `segments`, atomically.
    ///
    /// Returns the number of segments stored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the segments are not
    /// time-ordered and non-overlapping.
    fn replace_for_episode(
        &self,
        episode_id: EpisodeId,
        segments: &[SkipSegment],
    ) -> Result<usize>;

    /// Returns an episode's segments, ordered by `start_ms`.
    fn segments_for_episode(&self, episode_id: EpisodeId) -> Result<Vec<SkipSegment>>;

    /// Removes all segments for an episode. Idempotent; returns the number
    /// of segments removed.
    fn delete_for_episode(&self, episode_id: EpisodeId) -> Result<usize>;
}
