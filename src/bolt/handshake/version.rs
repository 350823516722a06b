//! Bolt protocol version identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A negotiated Bolt protocol version.
///
/// Versions travel as 4-byte big-endian integers laid out as
/// `[reserved, range, minor, major]`:
///
/// - `0x0000_0003` is version 3
/// - `0x0000_0104` is version 4.1
/// - `0x0002_0304` proposes 4.3 down to 4.1 (range 2)
///
/// The range byte is only meaningful in proposals; a chosen version never
/// carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(u32);

impl ProtocolVersion {
    /// Bolt 1
    pub const V1: ProtocolVersion = ProtocolVersion(1);
    /// Bolt 2
    pub const V2: ProtocolVersion = ProtocolVersion(2);
    /// Bolt 3 - HELLO, GOODBYE and explicit transactions
    pub const V3: ProtocolVersion = ProtocolVersion(3);
    /// Bolt 4.0 - PULL/DISCARD carry `n` and `qid`
    pub const V4_0: ProtocolVersion = ProtocolVersion(4);

    /// Version with the given major and minor numbers.
    pub const fn new(major: u8, minor: u8) -> Self {
        ProtocolVersion(((minor as u32) << 8) | major as u32)
    }

    /// Create a version from its raw wire value, dropping any range byte.
    pub const fn from_u32(value: u32) -> Self {
        ProtocolVersion(value & 0x0000_FFFF)
    }

    /// Get the raw u32 value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get the major version number.
    pub const fn major(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Get the minor version number.
    pub const fn minor(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Convert to big-endian bytes.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Whether explicit transactions (BEGIN/COMMIT/ROLLBACK) and GOODBYE exist.
    pub fn has_explicit_transactions(self) -> bool {
        self.major() >= 3
    }
}

/// A single client proposal: a version plus how many minors below it are
/// also acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProposal {
    raw: u32,
}

impl VersionProposal {
    pub const fn new(raw: u32) -> Self {
        Self { raw }
    }

    /// Empty slots are all-zero.
    pub fn is_empty(self) -> bool {
        self.raw == 0
    }

    /// Number of additional minor versions below the proposed one.
    pub fn range(self) -> u8 {
        ((self.raw >> 16) & 0xFF) as u8
    }

    /// Candidate versions, most preferred first.
    pub fn candidates(self) -> impl Iterator<Item = ProtocolVersion> {
        let top = ProtocolVersion::from_u32(self.raw);
        let lowest = top.minor().saturating_sub(self.range());
        (lowest..=top.minor())
            .rev()
            .map(move |minor| ProtocolVersion::new(top.major(), minor))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_layout() {
        assert_eq!(ProtocolVersion::V3.as_u32(), 3);
        assert_eq!(ProtocolVersion::new(4, 1).as_u32(), 0x0104);
        assert_eq!(ProtocolVersion::new(4, 1).major(), 4);
        assert_eq!(ProtocolVersion::new(4, 1).minor(), 1);
        assert_eq!(ProtocolVersion::V3.to_bytes(), [0, 0, 0, 3]);
    }

    #[test]
    fn test_from_u32_drops_range() {
        assert_eq!(ProtocolVersion::from_u32(0x0002_0304), ProtocolVersion::new(4, 3));
    }

    #[test]
    fn test_version_display() {
        assert_eq!(ProtocolVersion::V1.to_string(), "1.0");
        assert_eq!(ProtocolVersion::new(4, 3).to_string(), "4.3");
    }

    #[test]
    fn test_version_ordering() {
        assert!(ProtocolVersion::V3 > ProtocolVersion::V2);
        assert!(ProtocolVersion::new(4, 1) > ProtocolVersion::V4_0);
    }

    #[test]
    fn test_proposal_candidates() {
        let exact: Vec<_> = VersionProposal::new(3).candidates().collect();
        assert_eq!(exact, vec![ProtocolVersion::V3]);

        let ranged: Vec<_> = VersionProposal::new(0x0002_0304).candidates().collect();
        assert_eq!(
            ranged,
            vec![
                ProtocolVersion::new(4, 3),
                ProtocolVersion::new(4, 2),
                ProtocolVersion::new(4, 1),
            ]
        );
    }

    #[test]
    fn test_explicit_transactions() {
        assert!(!ProtocolVersion::V2.has_explicit_transactions());
        assert!(ProtocolVersion::V3.has_explicit_transactions());
        assert!(ProtocolVersion::V4_0.has_explicit_transactions());
    }
}
