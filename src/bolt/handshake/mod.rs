//! Bolt protocol handshake implementation.
//!
//! The Bolt handshake consists of:
//! 1. Client sends 4-byte magic number (0x6060B017)
//! 2. Client sends 4 x 4-byte version proposals (preferred first)
//! 3. Server responds with the 4-byte agreed version, or four zero bytes and
//!    closes the connection

mod negotiation;
mod version;

pub use negotiation::{build_client_handshake, HandshakeNegotiator, HandshakeOutcome};
pub use version::{ProtocolVersion, VersionProposal};

pub use super::error::HandshakeError;

/// Bolt protocol magic number: 0x6060B017
/// This identifies a Bolt connection.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the complete handshake message from client (magic + 4 versions)
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of server response (negotiated version)
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;
