//! Episode identifiers, stored frame records, and match results.

use super::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an episode in the external persistence layer.
///
/// The engine treats episodes as opaque integer keys used for scoping
/// (self-exclusion in lookups) and cascade deletes; episode metadata
/// lives with the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(i64);

impl EpisodeId {
    /// Creates a new episode ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EpisodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// One stored frame fingerprint.
///
/// Frame records are bulk-inserted during per-episode hashing, never
/// mutated, and deleted only as a whole episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    /// Episode the frame belongs to.
    pub episode_id: EpisodeId,
    /// Frame position within the episode, in milliseconds.
    pub timestamp_ms: u64,
    /// Perceptual fingerprint of the frame.
    pub fingerprint: Fingerprint,
}

impl FrameRecord {
    /// Creates a new frame record.
    #[must_use]
    pub const fn new(episode_id: EpisodeId, timestamp_ms: u64, fingerprint: Fingerprint) -> Self {
        Self {
            episode_id,
            timestamp_ms,
            fingerprint,
        }
    }
}

/// A near-duplicate hit between a source frame and a stored frame in
/// another episode.
///
/// Matches are ephemeral: computed on demand by the matcher, consumed by
/// the temporal grouper, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateMatch {
    /// Timestamp of the queried frame in the episode under analysis.
    pub source_timestamp_ms: u64,
    /// Episode that holds the matching frame.
    pub target_episode_id: EpisodeId,
    /// Timestamp of the matching frame in the target episode.
    pub target_timestamp_ms: u64,
    /// Hamming distance between the two fingerprints (0 to 64).
    pub distance: u32,
}
