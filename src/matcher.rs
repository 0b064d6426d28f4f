//! Cross-episode nearest-neighbor matching.

use crate::models::{DuplicateMatch, EpisodeId, FINGERPRINT_BITS, Fingerprint};
use crate::storage::HashStore;
use crate::{Error, Result};
use tracing::instrument;

/// Finds near-duplicate frames for an episode across all other stored
/// episodes.
///
/// The matcher queries each source fingerprint against the store's bucket
/// index, scoped to exclude the episode under analysis, and keeps hits
/// within the configured Hamming threshold.
///
/// # Example
///
/// ```rust
/// use skipfuse::storage::{HashStore, SqliteHashStore};
/// use skipfuse::{EpisodeId, Fingerprint, NearestNeighborMatcher};
///
/// let store = SqliteHashStore::in_memory(16)?;
/// store.add_batch(EpisodeId::new(1), &[(9000, Fingerprint::new(0xFF01 << 48))])?;
/// store.add_batch(EpisodeId::new(2), &[(10_000, Fingerprint::new(0xFF00 << 48))])?;
///
/// let matcher = NearestNeighborMatcher::new(&store, 8)?;
/// let matches = matcher.find_duplicates(EpisodeId::new(2))?;
/// assert_eq!(matches.len(), 1);
/// assert_eq!(matches[0].distance, 1);
/// # Ok::<(), skipfuse::Error>(())
/// ```
pub struct NearestNeighborMatcher<'a, S: HashStore + ?Sized> {
    /// The shared hash store holding all episodes' fingerprints.
    store: &'a S,
    /// Maximum Hamming distance for a match (0 to 64).
    max_distance: u32,
}

impl<'a, S: HashStore + ?Sized> NearestNeighborMatcher<'a, S> {
    /// Creates a matcher over `store` with the given Hamming threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `max_distance` exceeds the
    /// fingerprint width.
    pub fn new(store: &'a S, max_distance: u32) -> Result<Self> {
        if max_distance > FINGERPRINT_BITS {
            return Err(Error::InvalidInput(format!(
                "max_distance ({max_distance}) must not exceed {FINGERPRINT_BITS}"
            )));
        }
        Ok(Self {
            store,
            max_distance,
        })
    }

    /// Returns the configured Hamming threshold.
    #[must_use]
    pub const fn max_distance(&self) -> u32 {
        self.max_distance
    }

    /// Finds all duplicate frames for a stored episode in other episodes.
    ///
    /// Reads the episode's frames back from the store, so it works for
    /// reanalysis without re-hashing.
    ///
    /// # Errors
    ///
    /// Propagates store lookup failures.
    #[instrument(skip(self))]
    pub fn find_duplicates(&self, episode_id: EpisodeId) -> Result<Vec<DuplicateMatch>> {
        let frames: Vec<(u64, Fingerprint)> = self
            .store
            .frames_for_episode(episode_id)?
            .into_iter()
            .map(|record| (record.timestamp_ms, record.fingerprint))
            .collect();
        self.find_duplicates_for_frames(episode_id, &frames)
    }

    /// Finds duplicates for freshly hashed frames that may or may not be
    /// stored yet.
    ///
    /// Matches are ordered by `source_timestamp_ms` ascending, ties broken
    /// by smaller distance first, as the temporal grouper expects.
    ///
    /// # Errors
    ///
    /// Propagates store lookup failures.
    #[instrument(skip(self, frames), fields(frames = frames.len()))]
    pub fn find_duplicates_for_frames(
        &self,
        episode_id: EpisodeId,
        frames: &[(u64, Fingerprint)],
    ) -> Result<Vec<DuplicateMatch>> {
        let mut matches = Vec::new();
        for &(source_timestamp_ms, fingerprint) in frames {
            let hits = self
                .store
                .near_lookup(fingerprint, self.max_distance, episode_id)?;
            for (record, distance) in hits {
                matches.push(DuplicateMatch {
                    source_timestamp_ms,
                    target_episode_id: record.episode_id,
                    target_timestamp_ms: record.timestamp_ms,
                    distance,
                });
            }
        }
        matches.sort_by_key(|m| (m.source_timestamp_ms, m.distance));
        tracing::debug!(%episode_id, matches = matches.len(), "cross-episode matching done");
        Ok(matches)
    }
}
