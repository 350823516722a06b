//! PackStream marker bytes.
//!
//! Every value starts with one marker byte. Small strings, lists, maps and
//! structures pack their size into the low nibble of the marker; larger ones
//! carry an explicit big-endian size after it.

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

/// Smallest integer that fits in the marker byte itself.
pub const TINY_INT_MIN: i64 = -16;
/// Largest integer that fits in the marker byte itself.
pub const TINY_INT_MAX: i64 = 127;

/// Largest size that still fits in a tiny (nibble) header.
pub const TINY_SIZE_MAX: usize = 15;

/// Sized value families and their header markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Bytes,
    String,
    List,
    Map,
    Struct,
}

impl Family {
    /// High nibble of the tiny form, if the family has one.
    pub fn tiny_base(self) -> Option<u8> {
        match self {
            Family::Bytes => None,
            Family::String => Some(0x80),
            Family::List => Some(0x90),
            Family::Map => Some(0xA0),
            Family::Struct => Some(0xB0),
        }
    }

    /// Markers for the 8, 16 and 32 bit size forms (`None` where unsupported).
    pub fn sized_markers(self) -> [Option<u8>; 3] {
        match self {
            Family::Bytes => [Some(0xCC), Some(0xCD), Some(0xCE)],
            Family::String => [Some(0xD0), Some(0xD1), Some(0xD2)],
            Family::List => [Some(0xD4), Some(0xD5), Some(0xD6)],
            Family::Map => [Some(0xD8), Some(0xD9), Some(0xDA)],
            Family::Struct => [Some(0xDC), Some(0xDD), None],
        }
    }

    /// Human readable name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Family::Bytes => "bytes",
            Family::String => "string",
            Family::List => "list",
            Family::Map => "map",
            Family::Struct => "structure",
        }
    }
}

/// How a marker byte announces the size of what follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeHeader {
    /// Size is in the marker's low nibble.
    Tiny(Family, usize),
    /// Size follows as an unsigned big-endian integer of the given width.
    Explicit(Family, usize),
}

/// Classify a marker byte that introduces a sized value.
pub fn size_header(marker: u8) -> Option<SizeHeader> {
    let nibble = (marker & 0x0F) as usize;
    let tiny = match marker & 0xF0 {
        0x80 => Some(Family::String),
        0x90 => Some(Family::List),
        0xA0 => Some(Family::Map),
        0xB0 => Some(Family::Struct),
        _ => None,
    };
    if let Some(family) = tiny {
        return Some(SizeHeader::Tiny(family, nibble));
    }

    let explicit = match marker {
        0xCC => (Family::Bytes, 1),
        0xCD => (Family::Bytes, 2),
        0xCE => (Family::Bytes, 4),
        0xD0 => (Family::String, 1),
        0xD1 => (Family::String, 2),
        0xD2 => (Family::String, 4),
        0xD4 => (Family::List, 1),
        0xD5 => (Family::List, 2),
        0xD6 => (Family::List, 4),
        0xD8 => (Family::Map, 1),
        0xD9 => (Family::Map, 2),
        0xDA => (Family::Map, 4),
        0xDC => (Family::Struct, 1),
        0xDD => (Family::Struct, 2),
        _ => return None,
    };
    Some(SizeHeader::Explicit(explicit.0, explicit.1))
}

/// Tiny integers occupy `0x00..=0x7F` and `0xF0..=0xFF`.
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}
