//! PackStream serialization format.
//!
//! PackStream is the binary value encoding carried inside Bolt messages.
//! The protocol engine itself treats message payloads as opaque; this module
//! backs the default [`MessageCodec`](crate::bolt::message::MessageCodec)
//! implementation.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**, **Integer** (tiny to 64-bit), **Float** (64-bit)
//! - **String** and **Bytes** with tiny/8/16/32-bit size headers
//! - **List** and **Map** (string keys only)
//! - **Structure**: a signature byte plus fields; every Bolt message is one

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod value;

pub use decoder::{decode, PackStreamDecoder, MAX_DEPTH};
pub use encoder::{encode, pack, pack_structure};
pub use value::{PackStreamStructure, PackStreamValue};

use thiserror::Error;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackStreamError {
    /// Input ended in the middle of a value
    #[error("Unexpected end of PackStream data")]
    UnexpectedEof,

    /// Marker byte that starts no known value
    #[error("Unknown PackStream marker: 0x{0:02X}")]
    UnknownMarker(u8),

    /// String payload is not UTF-8
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(String),

    /// Map keys must be strings
    #[error("Map keys must be strings")]
    InvalidMapKey,

    /// Containers nested beyond the decoder limit
    #[error("Values nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// Bytes left over after the top-level value
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// Value too large to encode
    #[error("{0} too large: {1} elements")]
    ValueTooLarge(&'static str, usize),

    /// Structure has the wrong signature or field layout
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}
