//! Per-episode skip-list report, the JSON output contract.

use super::SkipSegment;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The final skip list for one episode, in the wire format consumed by
/// downstream collaborators (marker writers, players).
///
/// Segments are ordered by `start_ms` and non-overlapping; both
/// [`SkipReport::new`] and [`SkipReport::from_json`] enforce this.
///
/// # Example
///
/// ```rust
/// use skipfuse::models::{SegmentType, SkipReport, SkipSegment};
///
/// let report = SkipReport::new(
///     "/media/show/s01e02.mkv",
///     2_700_000,
///     vec![SkipSegment::new(0, 135_000, SegmentType::Recap, 0.9, "keyword(recap)")?],
/// )?;
/// let json = report.to_json()?;
/// assert!(json.contains("\"type\": \"recap\""));
/// # Ok::<(), skipfuse::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipReport {
    /// Path of the analyzed video file.
    pub file: String,
    /// Episode duration in milliseconds.
    pub duration_ms: u64,
    /// Fused skip segments, ordered by `start_ms`.
    pub segments: Vec<SkipSegment>,
}

impl SkipReport {
    /// Creates a report, validating every segment and the non-overlap
    /// invariant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if any segment has invalid bounds,
    /// extends past `duration_ms`, or overlaps its predecessor.
    pub fn new(
        file: impl Into<String>,
        duration_ms: u64,
        segments: Vec<SkipSegment>,
    ) -> Result<Self> {
        let report = Self {
            file: file.into(),
            duration_ms,
            segments,
        };
        report.validate()?;
        Ok(report)
    }

    /// Re-checks the report invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on any violation.
    pub fn validate(&self) -> Result<()> {
        for segment in &self.segments {
            segment.validate()?;
            if segment.end_ms > self.duration_ms {
                return Err(Error::InvalidInput(format!(
                    "segment end_ms ({}) exceeds episode duration ({})",
                    segment.end_ms, self.duration_ms
                )));
            }
        }
        for pair in self.segments.windows(2) {
            if pair[1].start_ms < pair[0].end_ms {
                return Err(Error::InvalidInput(format!(
                    "segments [{}, {}] and [{}, {}] overlap or are out of order",
                    pair[0].start_ms, pair[0].end_ms, pair[1].start_ms, pair[1].end_ms
                )));
            }
        }
        Ok(())
    }

    /// Serializes the report to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::OperationFailed {
            operation: "serialize_report".to_string(),
            cause: e.to_string(),
        })
    }

    /// Deserializes and validates a report from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the JSON is malformed or the
    /// decoded report violates its invariants.
    pub fn from_json(json: &str) -> Result<Self> {
        let report: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("malformed skip report: {e}")))?;
        report.validate()?;
        Ok(report)
    }

    /// Writes the report to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| Error::OperationFailed {
            operation: "write_report".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }

    /// Reads and validates a report from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the file cannot be read, or
    /// [`Error::InvalidInput`] if its contents are invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_report".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }
}
