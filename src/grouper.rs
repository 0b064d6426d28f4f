//! Temporal grouping of duplicate matches into candidate segments.

use crate::models::{CandidateSegment, DuplicateMatch, SegmentType};
use crate::{Error, Result};
use tracing::instrument;

/// Detector ID under which grouped duplicate segments are emitted.
pub const DUPLICATE_DETECTOR_ID: &str = "duplicate_frames";

/// Groups time-ordered duplicate matches into contiguous flashback
/// candidates.
///
/// Consecutive matches whose source timestamps sit within the gap
/// tolerance belong to one group; a group shorter than the minimum
/// duration is discarded. Confidence maps the group's mean Hamming
/// distance over `[0, max_distance]` linearly onto `[1.0, 0.5]`.
#[derive(Debug, Clone)]
pub struct TemporalGrouper {
    /// Maximum gap between consecutive matches in one group.
    gap_tolerance_ms: u64,
    /// Minimum duration for a group to become a segment.
    min_duration_ms: u64,
    /// Hamming threshold the matches were produced with; anchors the
    /// confidence mapping.
    max_distance: u32,
}

impl Default for TemporalGrouper {
    fn default() -> Self {
        Self {
            gap_tolerance_ms: 2000,
            min_duration_ms: 3000,
            max_distance: 8,
        }
    }
}

impl TemporalGrouper {
    /// Creates a grouper with explicit tunables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `max_distance` exceeds the
    /// fingerprint width.
    pub fn new(gap_tolerance_ms: u64, min_duration_ms: u64, max_distance: u32) -> Result<Self> {
        if max_distance > crate::models::FINGERPRINT_BITS {
            return Err(Error::InvalidInput(format!(
                "max_distance ({max_distance}) must not exceed {}",
                crate::models::FINGERPRINT_BITS
            )));
        }
        Ok(Self {
            gap_tolerance_ms,
            min_duration_ms,
            max_distance,
        })
    }

    /// Groups matches into flashback candidate segments.
    ///
    /// The input need not be sorted; grouping stable-sorts by
    /// `(source_timestamp_ms, distance)` first, so reruns over the same
    /// matches produce byte-identical segments and reasons.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] only if segment construction fails,
    /// which the duration filter rules out for well-formed matches.
    #[instrument(skip(self, matches), fields(matches = matches.len()))]
    pub fn group(&self, matches: &[DuplicateMatch]) -> Result<Vec<CandidateSegment>> {
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let mut sorted = matches.to_vec();
        sorted.sort_by_key(|m| (m.source_timestamp_ms, m.distance));

        let mut segments = Vec::new();
        let mut group: Vec<DuplicateMatch> = Vec::new();
        for &m in &sorted {
            if let Some(last) = group.last().copied()
                && m.source_timestamp_ms - last.source_timestamp_ms > self.gap_tolerance_ms
            {
                if let Some(segment) = self.close_group(&group)? {
                    segments.push(segment);
                }
                group.clear();
            }
            group.push(m);
        }
        if let Some(segment) = self.close_group(&group)? {
            segments.push(segment);
        }

        tracing::debug!(segments = segments.len(), "temporal grouping done");
        Ok(segments)
    }

    /// Builds a candidate segment from a closed group, or `None` when the
    /// group is too short.
    fn close_group(&self, group: &[DuplicateMatch]) -> Result<Option<CandidateSegment>> {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            return Ok(None);
        };
        let start_ms = first.source_timestamp_ms;
        let end_ms = last.source_timestamp_ms;
        if end_ms <= start_ms || end_ms - start_ms < self.min_duration_ms {
            return Ok(None);
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_distance =
            group.iter().map(|m| f64::from(m.distance)).sum::<f64>() / group.len() as f64;
        let confidence = self.confidence_for(avg_distance);

        // Lowest distance wins; remaining fields break ties so the reason
        // string is stable across reruns.
        let best = group
            .iter()
            .min_by_key(|m| {
                (
                    m.distance,
                    m.target_episode_id,
                    m.target_timestamp_ms,
                    m.source_timestamp_ms,
                )
            })
            .copied()
            .unwrap_or(*first);
        let reason = format!(
            "{DUPLICATE_DETECTOR_ID}(best=ep{}@{}ms, frames={}, avg_distance={avg_distance:.1})",
            best.target_episode_id,
            best.target_timestamp_ms,
            group.len()
        );

        CandidateSegment::new(
            start_ms,
            end_ms,
            SegmentType::Flashback,
            confidence,
            reason,
            DUPLICATE_DETECTOR_ID,
        )
        .map(Some)
    }

    /// Maps a mean distance in `[0, max_distance]` linearly onto
    /// `[1.0, 0.5]`, clamped outside that range.
    fn confidence_for(&self, avg_distance: f64) -> f64 {
        if self.max_distance == 0 {
            return 1.0;
        }
        let scaled = avg_distance / f64::from(self.max_distance);
        (1.0 - 0.5 * scaled).clamp(0.5, 1.0)
    }
}
