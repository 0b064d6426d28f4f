//! Analysis tunables.

use crate::models::FINGERPRINT_BITS;
use crate::{Error, Result};
use serde::Deserialize;

/// Tunables for matching, grouping, and fusion.
///
/// The defaults mirror the values the analysis pipeline has always run
/// with: a Hamming threshold of 8 bits over a 16-bit bucket prefix, 2 s of
/// gap tolerance, and a 3 s minimum segment duration.
///
/// # Bucket width vs. threshold
///
/// Near lookups only probe buckets whose leading `bucket_bits` bits are
/// within `hamming_threshold` flips of the query's. A match whose differing
/// bits all fall inside the prefix is therefore always found, but keeping
/// `hamming_threshold < bucket_bits` is what holds the false-negative rate
/// near zero in practice. [`AnalysisConfig::validate`] warns (it does not
/// fail) when the coupling is violated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Maximum Hamming distance for a frame match (0 to 64).
    pub hamming_threshold: u32,
    /// Number of leading fingerprint bits used as the bucket key (1 to 32).
    pub bucket_bits: u32,
    /// Maximum gap between consecutive matches grouped into one segment.
    pub gap_tolerance_ms: u64,
    /// Minimum duration for a grouped segment to be kept.
    pub min_duration_ms: u64,
    /// Confidence boost applied when two or more distinct detectors agree.
    pub agreement_boost: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: 8,
            bucket_bits: 16,
            gap_tolerance_ms: 2000,
            min_duration_ms: 3000,
            agreement_boost: 0.1,
        }
    }
}

impl AnalysisConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.hamming_threshold > FINGERPRINT_BITS {
            return Err(Error::InvalidInput(format!(
                "hamming_threshold ({}) must not exceed {FINGERPRINT_BITS}",
                self.hamming_threshold
            )));
        }
        if !(1..=32).contains(&self.bucket_bits) {
            return Err(Error::InvalidInput(format!(
                "bucket_bits ({}) must be in 1..=32",
                self.bucket_bits
            )));
        }
        if !self.agreement_boost.is_finite() || !(0.0..=1.0).contains(&self.agreement_boost) {
            return Err(Error::InvalidInput(format!(
                "agreement_boost ({}) must be in [0.0, 1.0]",
                self.agreement_boost
            )));
        }
        if self.hamming_threshold >= self.bucket_bits {
            tracing::warn!(
                hamming_threshold = self.hamming_threshold,
                bucket_bits = self.bucket_bits,
                "hamming_threshold >= bucket_bits raises the near-lookup false-negative rate"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_oversized_threshold() {
        let config = AnalysisConfig {
            hamming_threshold: 65,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_bucket_bits() {
        let config = AnalysisConfig {
            bucket_bits: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_boost() {
        let config = AnalysisConfig {
            agreement_boost: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_at_bucket_width_is_warned_not_rejected() {
        let config = AnalysisConfig {
            hamming_threshold: 16,
            bucket_bits: 16,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_toml_shaped_json() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"hamming_threshold": 4}"#).unwrap();
        assert_eq!(config.hamming_threshold, 4);
        assert_eq!(config.bucket_bits, 16);
    }

    #[test]
    fn test_deserialize_rejects_unknown_field() {
        assert!(serde_json::from_str::<AnalysisConfig>(r#"{"hamming": 4}"#).is_err());
    }
}
