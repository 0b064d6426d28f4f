//! Multi-detector segment fusion.

use crate::Result;
use crate::models::{CandidateSegment, SkipSegment};
use std::collections::BTreeSet;
use tracing::instrument;

/// Merges candidate segments from independent detectors into one
/// non-overlapping, confidence-ranked skip list.
///
/// Fusion is a pure function of its input: it owns no state beyond the
/// agreement boost, sweeps candidates left to right merging overlapping
/// ranges, and emits time-ordered [`SkipSegment`]s. Agreement between two
/// or more *distinct* detectors on a merged range earns a fixed confidence
/// boost; the same detector firing repeatedly never does.
///
/// # Example
///
/// ```rust
/// use skipfuse::models::{CandidateSegment, SegmentType};
/// use skipfuse::SegmentFusion;
///
/// let candidates = vec![
///     CandidateSegment::new(0, 130_000, SegmentType::Recap, 0.8, "keyword(recap)", "keyword")?,
///     CandidateSegment::new(5000, 135_000, SegmentType::Recap, 0.75, "scene(recap)", "scene")?,
/// ];
/// let fused = SegmentFusion::default().fuse(candidates)?;
/// assert_eq!(fused.len(), 1);
/// assert_eq!((fused[0].start_ms, fused[0].end_ms), (0, 135_000));
/// assert!((fused[0].confidence - 0.9).abs() < 1e-9);
/// # Ok::<(), skipfuse::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SegmentFusion {
    /// Confidence boost for multi-detector agreement, clamped into the
    /// merged segment's `[0, 1]` range.
    agreement_boost: f64,
}

impl Default for SegmentFusion {
    fn default() -> Self {
        Self {
            agreement_boost: 0.1,
        }
    }
}

impl SegmentFusion {
    /// Creates a fusion stage with an explicit agreement boost.
    #[must_use]
    pub const fn new(agreement_boost: f64) -> Self {
        Self { agreement_boost }
    }

    /// Fuses all detectors' candidates for one episode into the final
    /// skip list.
    ///
    /// The output is sorted by `start_ms` and non-overlapping:
    /// `segments[i].end_ms <= segments[i + 1].start_ms` for all `i`.
    /// Running fusion on its own output yields the same segments.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] only if segment construction
    /// fails, which validated candidates rule out.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn fuse(&self, mut candidates: Vec<CandidateSegment>) -> Result<Vec<SkipSegment>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        candidates.sort_by_key(|c| (c.start_ms, c.end_ms));

        let mut fused = Vec::new();
        let mut window: Vec<CandidateSegment> = Vec::new();
        let mut window_end = 0u64;

        for candidate in candidates {
            if window.is_empty() || candidate.start_ms <= window_end {
                window_end = window_end.max(candidate.end_ms);
                window.push(candidate);
            } else {
                fused.push(self.close_window(&window, window_end)?);
                window_end = candidate.end_ms;
                window.clear();
                window.push(candidate);
            }
        }
        fused.push(self.close_window(&window, window_end)?);

        tracing::debug!(segments = fused.len(), "segment fusion done");
        Ok(fused)
    }

    /// Emits one merged window as a skip segment.
    // Exact confidence equality is the documented tie-break condition.
    #[allow(clippy::float_cmp)]
    fn close_window(&self, window: &[CandidateSegment], window_end: u64) -> Result<SkipSegment> {
        // The window start is the sweep's leftmost candidate; the sort
        // guarantees that is the first entry.
        let start_ms = window[0].start_ms;

        // Highest-confidence contributor decides the type; ties go to the
        // earliest start.
        let mut best = &window[0];
        let mut confidence = best.confidence;
        for candidate in &window[1..] {
            confidence = confidence.max(candidate.confidence);
            if candidate.confidence > best.confidence
                || (candidate.confidence == best.confidence
                    && candidate.start_ms < best.start_ms)
            {
                best = candidate;
            }
        }

        let detectors: BTreeSet<&str> = window
            .iter()
            .map(|c| c.source_detector.as_str())
            .collect();
        if detectors.len() >= 2 {
            confidence = (confidence + self.agreement_boost).min(1.0);
        }

        let mut reasons: Vec<(&str, &str)> = window
            .iter()
            .map(|c| (c.source_detector.as_str(), c.reason.as_str()))
            .collect();
        reasons.sort_unstable();
        let reason = reasons
            .iter()
            .map(|(_, reason)| *reason)
            .collect::<Vec<_>>()
            .join("; ");

        SkipSegment::new(start_ms, window_end, best.segment_type, confidence, reason)
    }
}
