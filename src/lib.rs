//! # Skipfuse
//!
//! Cross-episode perceptual-duplicate index and skip-segment fusion engine.
//!
//! Skipfuse decides which time ranges of a TV episode are safe to skip.
//! It stores per-frame 64-bit perceptual fingerprints, finds near-duplicate
//! frames across a library of previously analyzed episodes (flashbacks,
//! repeated establishing shots), and fuses candidate segments from multiple
//! independent detectors into one non-overlapping, confidence-ranked list.
//!
//! ## Architecture
//!
//! - **[`storage::HashStore`]**: durable `(episode, timestamp) → fingerprint`
//!   store backed by `SQLite`, with an in-memory bucket index for lookups
//! - **[`NearestNeighborMatcher`]**: Hamming-distance search scoped to
//!   exclude the episode under analysis
//! - **[`TemporalGrouper`]**: turns time-ordered matches into candidate
//!   segments under gap-tolerance and minimum-duration rules
//! - **[`SegmentFusion`]**: merges all detectors' candidates into the final
//!   skip list
//!
//! Frame extraction, perceptual hashing, and the ML detectors themselves are
//! external collaborators; the engine consumes their well-typed output.
//!
//! ## Example
//!
//! ```rust,ignore
//! use skipfuse::{NearestNeighborMatcher, SegmentFusion, TemporalGrouper};
//! use skipfuse::storage::SqliteHashStore;
//!
//! let store = SqliteHashStore::new("./hashes.db", 16)?;
//! store.add_batch(episode_id, &frames)?;
//!
//! let matcher = NearestNeighborMatcher::new(&store, 8)?;
//! let matches = matcher.find_duplicates(episode_id)?;
//! let candidates = TemporalGrouper::default().group(&matches)?;
//! let skip_list = SegmentFusion::default().fuse(candidates)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod detector;
pub mod fusion;
pub mod grouper;
pub mod index;
pub mod matcher;
pub mod models;
pub mod storage;

// Re-exports for convenience
pub use config::AnalysisConfig;
pub use detector::{Detector, DuplicateFrameDetector};
pub use fusion::SegmentFusion;
pub use grouper::TemporalGrouper;
pub use matcher::NearestNeighborMatcher;
pub use models::{
    CandidateSegment, DetectorId, DuplicateMatch, EpisodeId, Fingerprint, FrameRecord,
    SegmentType, SkipReport, SkipSegment,
};
pub use storage::{HashStore, SegmentStore, SqliteHashStore, SqliteSegmentStore};

/// Error type for skipfuse operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed timestamps, confidence outside `[0,1]`, empty fingerprint |
/// | `DuplicateEpisodeData` | Batch write for an episode that already has stored hashes |
/// | `IndexCorruption` | Bucket/record mismatch detected during a lookup |
/// | `OperationFailed` | `SQLite` failures, filesystem I/O errors |
///
/// A lookup against an index with zero other episodes is NOT an error; it
/// returns an empty match list (cold-start case).
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A segment has `start_ms >= end_ms`
    /// - A confidence value falls outside `[0.0, 1.0]`
    /// - A fingerprint hex string is empty or malformed
    /// - A configuration value is out of range
    ///
    /// Rejected at the boundary, never recovered internally.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A batch write was attempted for an episode that already has data.
    ///
    /// Not retried automatically; the caller decides whether to
    /// delete-then-reinsert to reanalyze.
    #[error("episode {episode_id} already has stored frame hashes")]
    DuplicateEpisodeData {
        /// The episode with existing data.
        episode_id: models::EpisodeId,
    },

    /// An internal index invariant was violated.
    ///
    /// Raised when a lookup finds a record whose fingerprint disagrees with
    /// the bucket it is filed under, or a persisted row cannot be decoded.
    /// Fatal for the affected operation: the engine fails loudly rather
    /// than return a possibly wrong match.
    #[error("index corruption: {detail}")]
    IndexCorruption {
        /// What was found to be inconsistent.
        detail: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - Filesystem I/O errors occur
    ///
    /// The `operation` field identifies the failing stage (store write,
    /// matching, grouping, fusion).
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for skipfuse operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::DuplicateEpisodeData {
            episode_id: models::EpisodeId::new(3),
        };
        assert_eq!(err.to_string(), "episode 3 already has stored frame hashes");

        let err = Error::OperationFailed {
            operation: "add_batch".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'add_batch' failed: disk full");
    }
}
