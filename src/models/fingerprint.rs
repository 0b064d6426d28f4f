//! Perceptual fingerprint type and Hamming distance.

use crate::{Error, Result};
use std::fmt;

/// Width of a fingerprint in bits.
pub const FINGERPRINT_BITS: u32 = 64;

/// A 64-bit perceptual fingerprint of one video frame.
///
/// The fingerprint is an opaque fixed-width binary value produced by an
/// external hashing primitive. Two frames with visually similar content
/// produce fingerprints with a small [Hamming distance](Self::distance);
/// the engine never interprets individual bits beyond that comparison.
///
/// Fingerprints are immutable once computed and persist as 16-character
/// lowercase hex (the `fingerprint_hex` column format).
///
/// # Example
///
/// ```rust
/// use skipfuse::models::Fingerprint;
///
/// let a = Fingerprint::new(0xFF00_0000_0000_0000);
/// let b = Fingerprint::new(0xFF01_0000_0000_0000);
/// assert_eq!(a.distance(b), 1);
/// assert_eq!(a.to_hex(), "ff00000000000000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Creates a fingerprint from its raw 64-bit value.
    #[must_use]
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Hamming distance to another fingerprint (0 to 64).
    ///
    /// Symmetric, and zero iff the fingerprints are equal.
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Returns the leading `bits` bits, right-aligned.
    ///
    /// Used by the bucket index to derive bucket keys. `bits` must be
    /// in `1..=32`; callers validate the width at construction time.
    #[must_use]
    pub const fn prefix(self, bits: u32) -> u32 {
        (self.0 >> (FINGERPRINT_BITS - bits)) as u32
    }

    /// Parses a fingerprint from its persisted 16-character hex form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the string is empty, not
    /// 16 characters, or contains non-hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidInput("empty fingerprint".to_string()));
        }
        let bytes = hex::decode(s)
            .map_err(|e| Error::InvalidInput(format!("malformed fingerprint '{s}': {e}")))?;
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "fingerprint '{s}' is not {FINGERPRINT_BITS} bits wide"
            ))
        })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }

    /// Returns the persisted 16-character lowercase hex form.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<u64> for Fingerprint {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_symmetric() {
        let a = Fingerprint::new(0b1010);
        let b = Fingerprint::new(0b0110);
        assert_eq!(a.distance(b), b.distance(a));
        assert_eq!(a.distance(b), 2);
    }

    #[test]
    fn test_distance_identity() {
        let a = Fingerprint::new(0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(a.distance(a), 0);
    }

    #[test]
    fn test_distance_all_bits() {
        let a = Fingerprint::new(0);
        let b = Fingerprint::new(u64::MAX);
        assert_eq!(a.distance(b), 64);
    }

    #[test]
    fn test_hex_roundtrip() {
        let fp = Fingerprint::new(0xFF01_0203_0405_0607);
        let parsed = Fingerprint::from_hex(&fp.to_hex()).unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn test_hex_zero_padded() {
        let fp = Fingerprint::new(0x1);
        assert_eq!(fp.to_hex(), "0000000000000001");
    }

    #[test]
    fn test_from_hex_empty_rejected() {
        let err = Fingerprint::from_hex("").unwrap_err();
        assert!(err.to_string().contains("empty fingerprint"));
    }

    #[test]
    fn test_from_hex_malformed_rejected() {
        assert!(Fingerprint::from_hex("not-hex-at-all!!").is_err());
        assert!(Fingerprint::from_hex("ff00").is_err());
        assert!(Fingerprint::from_hex("ff000000000000000000").is_err());
    }

    #[test]
    fn test_prefix() {
        let fp = Fingerprint::new(0xFF01_0000_0000_0000);
        assert_eq!(fp.prefix(16), 0xFF01);
        assert_eq!(fp.prefix(8), 0xFF);
    }
}
