//! Detector abstraction and the built-in duplicate-frame detector.

use crate::grouper::TemporalGrouper;
use crate::matcher::NearestNeighborMatcher;
use crate::models::{CandidateSegment, DetectorId, EpisodeId, Fingerprint};
use crate::storage::HashStore;
use crate::{AnalysisConfig, Result};
use tracing::instrument;

/// A producer of candidate skip segments for one episode.
///
/// Detectors may wrap lazily loaded external models; availability is a
/// capability check, not a special-cased code path. An unavailable
/// detector simply contributes an empty candidate list via
/// [`collect_candidates`].
pub trait Detector {
    /// Identity used for provenance and the fusion agreement boost.
    fn id(&self) -> DetectorId;

    /// Whether the detector can run (e.g. its model is present).
    fn is_available(&self) -> bool {
        true
    }

    /// Produces the detector's candidate segments for an episode.
    ///
    /// # Errors
    ///
    /// Returns a detector-specific error; callers decide whether a failed
    /// detector aborts the episode's analysis.
    fn detect(&self, episode_id: EpisodeId) -> Result<Vec<CandidateSegment>>;
}

/// Runs every available detector and pools their candidates for fusion.
///
/// Unavailable detectors are skipped with a log line; a failing detector
/// aborts with its error.
///
/// # Errors
///
/// Propagates the first detector failure.
pub fn collect_candidates(
    detectors: &[&dyn Detector],
    episode_id: EpisodeId,
) -> Result<Vec<CandidateSegment>> {
    let mut candidates = Vec::new();
    for detector in detectors {
        if !detector.is_available() {
            tracing::debug!(detector = %detector.id(), "detector unavailable, skipping");
            continue;
        }
        candidates.extend(detector.detect(episode_id)?);
    }
    Ok(candidates)
}

/// The built-in cross-episode duplicate-frame detector.
///
/// Chains the nearest-neighbor matcher and the temporal grouper over a
/// shared hash store: stored fingerprints of the episode under analysis
/// are matched against every other episode, and contiguous match runs
/// become flashback candidates.
pub struct DuplicateFrameDetector<'a, S: HashStore + ?Sized> {
    matcher: NearestNeighborMatcher<'a, S>,
    grouper: TemporalGrouper,
}

impl<'a, S: HashStore + ?Sized> DuplicateFrameDetector<'a, S> {
    /// Creates the detector over `store` with the given tunables.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the configuration is out
    /// of range.
    pub fn new(store: &'a S, config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            matcher: NearestNeighborMatcher::new(store, config.hamming_threshold)?,
            grouper: TemporalGrouper::new(
                config.gap_tolerance_ms,
                config.min_duration_ms,
                config.hamming_threshold,
            )?,
        })
    }

    /// Detects duplicates for frames that were just hashed and stored.
    ///
    /// Avoids reading the episode's frames back from the store when the
    /// caller still holds them.
    ///
    /// # Errors
    ///
    /// Propagates matching or grouping failures.
    #[instrument(skip(self, frames), fields(frames = frames.len()))]
    pub fn detect_for_frames(
        &self,
        episode_id: EpisodeId,
        frames: &[(u64, Fingerprint)],
    ) -> Result<Vec<CandidateSegment>> {
        let matches = self
            .matcher
            .find_duplicates_for_frames(episode_id, frames)?;
        self.grouper.group(&matches)
    }
}

impl<S: HashStore + ?Sized> Detector for DuplicateFrameDetector<'_, S> {
    fn id(&self) -> DetectorId {
        DetectorId::new(crate::grouper::DUPLICATE_DETECTOR_ID)
    }

    #[instrument(skip(self))]
    fn detect(&self, episode_id: EpisodeId) -> Result<Vec<CandidateSegment>> {
        let matches = self.matcher.find_duplicates(episode_id)?;
        self.grouper.group(&matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentType;
    use crate::storage::SqliteHashStore;

    fn fp(bits: u64) -> Fingerprint {
        Fingerprint::new(bits)
    }

    struct FixedDetector {
        id: &'static str,
        available: bool,
        candidates: Vec<CandidateSegment>,
    }

    impl Detector for FixedDetector {
        fn id(&self) -> DetectorId {
            DetectorId::new(self.id)
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn detect(&self, _episode_id: EpisodeId) -> Result<Vec<CandidateSegment>> {
            Ok(self.candidates.clone())
        }
    }

    #[test]
    fn test_unavailable_detector_contributes_nothing() {
        let candidate =
            CandidateSegment::new(0, 5000, SegmentType::Recap, 0.9, "keyword(recap)", "keyword")
                .unwrap();
        let present = FixedDetector {
            id: "keyword",
            available: true,
            candidates: vec![candidate.clone()],
        };
        let absent = FixedDetector {
            id: "scene",
            available: false,
            candidates: vec![candidate],
        };

        let pooled =
            collect_candidates(&[&present, &absent], EpisodeId::new(1)).unwrap();
        assert_eq!(pooled.len(), 1);
        assert_eq!(pooled[0].source_detector.as_str(), "keyword");
    }

    #[test]
    fn test_duplicate_detector_end_to_end() {
        let store = SqliteHashStore::in_memory(16).unwrap();
        // Episode 1: a five-second run of frames.
        let library: Vec<(u64, Fingerprint)> =
            (0..5u64).map(|i| (60_000 + i * 1000, fp(0xAB00 << 48 | i))).collect();
        store.add_batch(EpisodeId::new(1), &library).unwrap();
        // Episode 2: the same shots reappear near the start.
        let episode: Vec<(u64, Fingerprint)> =
            (0..5u64).map(|i| (i * 1000, fp(0xAB00 << 48 | i))).collect();
        store.add_batch(EpisodeId::new(2), &episode).unwrap();

        let detector =
            DuplicateFrameDetector::new(&store, &AnalysisConfig::default()).unwrap();
        let candidates = detector.detect(EpisodeId::new(2)).unwrap();

        assert_eq!(candidates.len(), 1);
        let segment = &candidates[0];
        assert_eq!((segment.start_ms, segment.end_ms), (0, 4000));
        assert_eq!(segment.segment_type, SegmentType::Flashback);
        assert_eq!(segment.source_detector.as_str(), "duplicate_frames");
    }

    #[test]
    fn test_detect_for_frames_matches_detect() {
        let store = SqliteHashStore::in_memory(16).unwrap();
        let frames: Vec<(u64, Fingerprint)> =
            (0..5u64).map(|i| (i * 1000, fp(0xCD00 << 48 | i))).collect();
        store.add_batch(EpisodeId::new(1), &frames).unwrap();
        store.add_batch(EpisodeId::new(2), &frames).unwrap();

        let detector =
            DuplicateFrameDetector::new(&store, &AnalysisConfig::default()).unwrap();
        let stored = detector.detect(EpisodeId::new(2)).unwrap();
        let direct = detector.detect_for_frames(EpisodeId::new(2), &frames).unwrap();
        assert_eq!(stored, direct);
    }

    #[test]
    fn test_cold_start_no_candidates() {
        let store = SqliteHashStore::in_memory(16).unwrap();
        store
            .add_batch(EpisodeId::new(1), &[(0, fp(0xAA)), (1000, fp(0xBB))])
            .unwrap();

        let detector =
            DuplicateFrameDetector::new(&store, &AnalysisConfig::default()).unwrap();
        assert!(detector.detect(EpisodeId::new(1)).unwrap().is_empty());
    }
}
