//! Candidate and fused skip segments.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a skippable time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    /// Recap of previous episodes.
    Recap,
    /// Preview of upcoming episodes.
    Preview,
    /// Establishing shot reused across episodes.
    RepeatedEstablishingShot,
    /// Footage repeated from a different episode.
    Flashback,
    /// Padding content with no narrative value.
    Filler,
}

impl SegmentType {
    /// All segment types, in persisted-name order.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Recap,
            Self::Preview,
            Self::RepeatedEstablishingShot,
            Self::Flashback,
            Self::Filler,
        ]
    }

    /// Returns the persisted name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recap => "recap",
            Self::Preview => "preview",
            Self::RepeatedEstablishingShot => "repeated_establishing_shot",
            Self::Flashback => "flashback",
            Self::Filler => "filler",
        }
    }

    /// Parses a persisted type name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recap" => Some(Self::Recap),
            "preview" => Some(Self::Preview),
            "repeated_establishing_shot" => Some(Self::RepeatedEstablishingShot),
            "flashback" => Some(Self::Flashback),
            "filler" => Some(Self::Filler),
            _ => None,
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of the detector that produced a candidate segment.
///
/// Distinct detector IDs are what the fusion stage counts when deciding
/// whether independent detectors agree on a range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectorId(String);

impl DetectorId {
    /// Creates a new detector ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DetectorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DetectorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Validates the shared segment fields.
fn validate_bounds(start_ms: u64, end_ms: u64, confidence: f64) -> Result<()> {
    if start_ms >= end_ms {
        return Err(Error::InvalidInput(format!(
            "segment start_ms ({start_ms}) must be less than end_ms ({end_ms})"
        )));
    }
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(Error::InvalidInput(format!(
            "segment confidence ({confidence}) must be in [0.0, 1.0]"
        )));
    }
    Ok(())
}

/// An unconfirmed skip-range proposal from one detector.
///
/// Immutable once emitted by its producer; the fusion stage consumes
/// candidates by value and never hands them back.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSegment {
    /// Segment start, in milliseconds.
    pub start_ms: u64,
    /// Segment end, in milliseconds. Always greater than `start_ms`.
    pub end_ms: u64,
    /// Classification of the range.
    pub segment_type: SegmentType,
    /// Detector confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Provenance string, conventionally `detector_name(parameters)`.
    pub reason: String,
    /// Detector that produced the candidate.
    pub source_detector: DetectorId,
}

impl CandidateSegment {
    /// Creates a candidate segment, validating its bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `start_ms >= end_ms` or the
    /// confidence falls outside `[0.0, 1.0]`.
    pub fn new(
        start_ms: u64,
        end_ms: u64,
        segment_type: SegmentType,
        confidence: f64,
        reason: impl Into<String>,
        source_detector: impl Into<DetectorId>,
    ) -> Result<Self> {
        validate_bounds(start_ms, end_ms, confidence)?;
        Ok(Self {
            start_ms,
            end_ms,
            segment_type,
            confidence,
            reason: reason.into(),
            source_detector: source_detector.into(),
        })
    }

    /// Segment duration in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// A fused, final skip decision for a time range.
///
/// The full set of skip segments for one episode is non-overlapping and
/// ordered by `start_ms`; [`crate::SegmentFusion`] upholds that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipSegment {
    /// Segment start, in milliseconds.
    pub start_ms: u64,
    /// Segment end, in milliseconds. Always greater than `start_ms`.
    pub end_ms: u64,
    /// Classification of the range.
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    /// Fused confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Concatenated provenance of the contributing candidates.
    pub reason: String,
}

impl SkipSegment {
    /// Creates a skip segment, validating its bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `start_ms >= end_ms` or the
    /// confidence falls outside `[0.0, 1.0]`.
    pub fn new(
        start_ms: u64,
        end_ms: u64,
        segment_type: SegmentType,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Result<Self> {
        validate_bounds(start_ms, end_ms, confidence)?;
        Ok(Self {
            start_ms,
            end_ms,
            segment_type,
            confidence,
            reason: reason.into(),
        })
    }

    /// Re-checks the bounds invariant, e.g. after deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the segment violates its bounds.
    pub fn validate(&self) -> Result<()> {
        validate_bounds(self.start_ms, self.end_ms, self.confidence)
    }

    /// Segment duration in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("recap", SegmentType::Recap)]
    #[test_case("preview", SegmentType::Preview)]
    #[test_case("repeated_establishing_shot", SegmentType::RepeatedEstablishingShot)]
    #[test_case("flashback", SegmentType::Flashback)]
    #[test_case("filler", SegmentType::Filler)]
    fn test_segment_type_roundtrip(name: &str, ty: SegmentType) {
        assert_eq!(ty.as_str(), name);
        assert_eq!(SegmentType::parse(name), Some(ty));
    }

    #[test]
    fn test_segment_type_parse_unknown() {
        assert_eq!(SegmentType::parse("credits"), None);
    }

    #[test]
    fn test_segment_type_json_snake_case() {
        let json = serde_json::to_string(&SegmentType::RepeatedEstablishingShot).unwrap();
        assert_eq!(json, "\"repeated_establishing_shot\"");
    }

    #[test]
    fn test_candidate_rejects_inverted_range() {
        let err =
            CandidateSegment::new(5000, 5000, SegmentType::Recap, 0.8, "keyword(recap)", "keyword")
                .unwrap_err();
        assert!(err.to_string().contains("start_ms"));
    }

    #[test_case(-0.1)]
    #[test_case(1.1)]
    #[test_case(f64::NAN)]
    fn test_candidate_rejects_bad_confidence(confidence: f64) {
        assert!(
            CandidateSegment::new(
                0,
                1000,
                SegmentType::Recap,
                confidence,
                "keyword(recap)",
                "keyword"
            )
            .is_err()
        );
    }

    #[test]
    fn test_skip_segment_json_shape() {
        let seg = SkipSegment::new(0, 4000, SegmentType::Flashback, 0.9, "x(y)").unwrap();
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json["type"], "flashback");
        assert_eq!(json["start_ms"], 0);
        assert_eq!(json["end_ms"], 4000);
    }

    #[test]
    fn test_skip_segment_validate_after_deserialize() {
        let seg: SkipSegment = serde_json::from_str(
            r#"{"start_ms": 9, "end_ms": 3, "type": "recap", "confidence": 0.5, "reason": "r"}"#,
        )
        .unwrap();
        assert!(seg.validate().is_err());
    }

    #[test]
    fn test_duration() {
        let seg = SkipSegment::new(1000, 4000, SegmentType::Recap, 1.0, "r").unwrap();
        assert_eq!(seg.duration_ms(), 3000);
    }
}
