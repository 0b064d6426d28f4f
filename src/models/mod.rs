//! Core data types for the duplicate index and fusion engine.

mod fingerprint;
mod frame;
mod report;
mod segment;

pub use fingerprint::{FINGERPRINT_BITS, Fingerprint};
pub use frame::{DuplicateMatch, EpisodeId, FrameRecord};
pub use report::SkipReport;
pub use segment::{CandidateSegment, DetectorId, SegmentType, SkipSegment};
