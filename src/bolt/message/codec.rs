//! Boundary between chunk payloads and typed messages.

use bytes::{Bytes, BytesMut};

use super::{BoltRequest, BoltResponse};
use crate::bolt::handshake::ProtocolVersion;
use crate::bolt::packstream::{self, PackStreamValue};
use crate::bolt::{BoltError, BoltResult};

/// Converts reassembled payloads into requests and responses into payloads.
///
/// One codec instance serves one negotiated protocol version. The
/// connection core never looks inside the payload itself.
pub trait MessageCodec: Send + Sync {
    /// Decode one request. An empty payload is never a valid request.
    fn decode(&self, payload: &[u8]) -> BoltResult<BoltRequest>;

    /// Encode one response.
    fn encode(&self, response: &BoltResponse) -> BoltResult<Bytes>;
}

/// PackStream-based codec for protocol versions 1 through 4.
#[derive(Debug, Clone, Copy)]
pub struct PackStreamCodec {
    version: ProtocolVersion,
}

impl PackStreamCodec {
    pub fn new(version: ProtocolVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Client-side encoding of a request.
    ///
    /// This is mainly useful for testing.
    pub fn encode_request(&self, request: &BoltRequest) -> BoltResult<Bytes> {
        let mut dst = BytesMut::with_capacity(64);
        packstream::pack_structure(&request.to_structure(self.version), &mut dst)?;
        Ok(dst.freeze())
    }

    /// Client-side decoding of a response.
    ///
    /// This is mainly useful for testing.
    pub fn decode_response(&self, payload: &[u8]) -> BoltResult<BoltResponse> {
        BoltResponse::from_structure(decode_structure(payload)?)
    }
}

fn decode_structure(payload: &[u8]) -> BoltResult<packstream::PackStreamStructure> {
    if payload.is_empty() {
        return Err(BoltError::invalid_message("Empty message"));
    }
    match packstream::decode(payload)? {
        PackStreamValue::Structure(s) => Ok(s),
        other => Err(BoltError::invalid_message(format!(
            "Expected a message structure, got {}",
            other.type_name()
        ))),
    }
}

impl MessageCodec for PackStreamCodec {
    fn decode(&self, payload: &[u8]) -> BoltResult<BoltRequest> {
        BoltRequest::from_structure(decode_structure(payload)?, self.version)
    }

    fn encode(&self, response: &BoltResponse) -> BoltResult<Bytes> {
        let mut dst = BytesMut::with_capacity(64);
        packstream::pack_structure(&response.to_structure(), &mut dst)?;
        Ok(dst.freeze())
    }
}
