//! Bolt chunk framing for tokio_util.
//!
//! A logical message travels as a sequence of chunks, each prefixed with a
//! 2-byte big-endian length, and ends with a zero-length chunk:
//!
//! ```text
//! 00 03 B0 01 A0   00 02 0F 00   00 00
//! |  chunk 1   |   | chunk 2 |   | end |
//! ```
//!
//! The decoder only reassembles payloads; turning them into messages is the
//! job of a [`MessageCodec`](super::message::MessageCodec).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::BoltError;

/// Largest chunk the 2-byte length prefix can describe
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// Default chunk size used when splitting outbound messages (16KB)
pub const DEFAULT_CHUNK_SIZE: usize = 16384;

/// Default limit for one reassembled inbound message (16MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

const HEADER_SIZE: usize = 2;

/// Chunk framing codec.
///
/// Decoding yields complete message payloads; an empty payload is returned
/// as-is and must be rejected by the caller. Encoding appends a payload as
/// chunks of at most `max_chunk_size` bytes plus the end marker.
#[derive(Debug)]
pub struct ChunkCodec {
    /// Maximum reassembled message size
    max_message_size: usize,
    /// Maximum outbound chunk payload
    max_chunk_size: usize,
    /// Chunks of the message in progress
    message_buffer: BytesMut,
}

impl ChunkCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_CHUNK_SIZE)
    }

    /// Create a codec with explicit limits.
    ///
    /// `max_chunk_size` is clamped to `1..=65535`.
    pub fn with_limits(max_message_size: usize, max_chunk_size: usize) -> Self {
        Self {
            max_message_size,
            max_chunk_size: max_chunk_size.clamp(1, MAX_CHUNK_SIZE),
            message_buffer: BytesMut::with_capacity(4096),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Whether part of a message has been received but not its end marker.
    pub fn in_message(&self) -> bool {
        !self.message_buffer.is_empty()
    }

    /// Start a resumable encoding of `payload`.
    pub fn chunked(&self, payload: Bytes) -> ChunkedMessage {
        ChunkedMessage::new(payload, self.max_chunk_size)
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkCodec {
    type Item = Bytes;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Need at least 2 bytes for chunk header
            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(HEADER_SIZE);
                return Ok(Some(self.message_buffer.split().freeze()));
            }

            let size = self.message_buffer.len() + chunk_size;
            if size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            if src.len() < HEADER_SIZE + chunk_size {
                src.reserve(HEADER_SIZE + chunk_size - src.len());
                return Ok(None);
            }

            src.advance(HEADER_SIZE);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl Encoder<Bytes> for ChunkCodec {
    type Error = BoltError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut message = self.chunked(item);
        dst.reserve(message.remaining());
        message.write_into(dst, usize::MAX);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Chunk header; `written` of its 2 bytes already emitted
    Header { len: usize, written: usize },
    /// Chunk body; `left` payload bytes still to emit
    Body { left: usize },
    /// End marker
    Terminator { written: usize },
    Done,
}

/// One outbound message being framed into one or more output buffers.
///
/// Each call to [`write_into`](Self::write_into) emits at most `budget`
/// bytes, splitting headers and chunk bodies across calls when needed, so a
/// large message never has to fit into a single write.
#[derive(Debug)]
pub struct ChunkedMessage {
    payload: Bytes,
    max_chunk_size: usize,
    stage: Stage,
}

impl ChunkedMessage {
    fn new(payload: Bytes, max_chunk_size: usize) -> Self {
        let mut message = Self {
            payload,
            max_chunk_size,
            stage: Stage::Done,
        };
        message.stage = message.next_chunk();
        message
    }

    fn next_chunk(&self) -> Stage {
        match self.payload.len().min(self.max_chunk_size) {
            0 => Stage::Terminator { written: 0 },
            len => Stage::Header { len, written: 0 },
        }
    }

    /// Bytes still to be written, headers and end marker included.
    pub fn remaining(&self) -> usize {
        let (current, rest) = match self.stage {
            Stage::Done => return 0,
            Stage::Terminator { written } => return HEADER_SIZE - written,
            Stage::Header { len, written } => (HEADER_SIZE - written + len, self.payload.len() - len),
            Stage::Body { left } => (left, self.payload.len() - left),
        };
        let chunks = rest.div_ceil(self.max_chunk_size);
        current + rest + chunks * HEADER_SIZE + HEADER_SIZE
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Append up to `budget` framed bytes to `dst`; returns how many.
    pub fn write_into(&mut self, dst: &mut BytesMut, budget: usize) -> usize {
        let mut written = 0;
        while written < budget {
            let room = budget - written;
            match self.stage {
                Stage::Done => break,
                Stage::Header { len, written: done } => {
                    let header = (len as u16).to_be_bytes();
                    let n = (HEADER_SIZE - done).min(room);
                    dst.put_slice(&header[done..done + n]);
                    written += n;
                    self.stage = if done + n == HEADER_SIZE {
                        Stage::Body { left: len }
                    } else {
                        Stage::Header { len, written: done + n }
                    };
                }
                Stage::Body { left } => {
                    let n = left.min(room);
                    dst.put_slice(&self.payload[..n]);
                    self.payload.advance(n);
                    written += n;
                    self.stage = if n == left {
                        self.next_chunk()
                    } else {
                        Stage::Body { left: left - n }
                    };
                }
                Stage::Terminator { written: done } => {
                    let n = (HEADER_SIZE - done).min(room);
                    dst.put_slice(&END_MARKER[done..done + n]);
                    written += n;
                    self.stage = if done + n == HEADER_SIZE {
                        Stage::Done
                    } else {
                        Stage::Terminator { written: done + n }
                    };
                }
            }
        }
        written
    }
}
