//! Transport selection.
//!
//! The first bytes of a physical connection decide how it is read:
//!
//! | First bytes | Transport |
//! |-------------|-----------|
//! | TLS record header (`16 03 0x ..`) | decrypt, then classify again |
//! | `GET ` | HTTP upgrade to WebSocket, Bolt in binary frames |
//! | `60 60 B0 17` | raw Bolt |
//! | anything else | fatal, closed |
//!
//! Classification needs five bytes and runs once per connection before any
//! protocol version is known.

mod rewind;
mod tls;
mod websocket;

pub use rewind::Rewind;
pub use tls::TlsConfig;
pub use websocket::{WebSocketReader, WebSocketWriter};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use super::error::HandshakeError;
use super::handshake::BOLT_MAGIC;
use super::{BoltError, BoltResult};

/// Bytes needed before a decision is made.
pub const CLASSIFY_SIZE: usize = 5;

const TLS_HANDSHAKE_RECORD: u8 = 0x16;
const TLS_MAJOR_VERSION: u8 = 0x03;
/// Largest TLS record payload plus expansion allowance
const TLS_MAX_RECORD_LENGTH: usize = 16384 + 2048;
const HTTP_GET: [u8; 4] = *b"GET ";

/// Any byte stream a connection can run over.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Result of sniffing the first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Fewer than five bytes; read more
    Partial,
    Tls,
    WebSocket,
    Bolt,
    Unknown,
}

/// Decide what the first bytes of a connection are.
pub fn classify(prefix: &[u8]) -> Classification {
    if prefix.len() < CLASSIFY_SIZE {
        return Classification::Partial;
    }
    if is_tls_record(prefix) {
        Classification::Tls
    } else if prefix[..4] == HTTP_GET {
        Classification::WebSocket
    } else if prefix[..4] == BOLT_MAGIC {
        Classification::Bolt
    } else {
        Classification::Unknown
    }
}

/// TLS record header: content type, version major/minor, 16-bit length.
fn is_tls_record(header: &[u8]) -> bool {
    let length = u16::from_be_bytes([header[3], header[4]]) as usize;
    header[0] == TLS_HANDSHAKE_RECORD
        && header[1] == TLS_MAJOR_VERSION
        && header[2] <= 0x04
        && length > 0
        && length <= TLS_MAX_RECORD_LENGTH
}

/// An established, classified transport.
pub enum Transport {
    /// Raw Bolt bytes, possibly inside TLS
    Stream { stream: BoxedStream, secure: bool },
    /// Bolt inside WebSocket binary frames, possibly inside TLS
    WebSocket {
        reader: WebSocketReader,
        writer: WebSocketWriter,
        secure: bool,
    },
}

impl Transport {
    /// Whether TLS was negotiated underneath.
    pub fn is_secure(&self) -> bool {
        match self {
            Transport::Stream { secure, .. } | Transport::WebSocket { secure, .. } => *secure,
        }
    }

    pub fn kind(&self) -> &'static str {
        match (self, self.is_secure()) {
            (Transport::Stream { .. }, false) => "bolt",
            (Transport::Stream { .. }, true) => "bolt+tls",
            (Transport::WebSocket { .. }, false) => "websocket",
            (Transport::WebSocket { .. }, true) => "websocket+tls",
        }
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        match self {
            Transport::Stream { stream, .. } => {
                let (read, write) = tokio::io::split(stream);
                (TransportReader::Stream(read), TransportWriter::Stream(write))
            }
            Transport::WebSocket { reader, writer, .. } => {
                (TransportReader::WebSocket(reader), TransportWriter::WebSocket(writer))
            }
        }
    }
}

/// Classify `stream`, installing TLS and WebSocket layers as needed.
///
/// Returns the transport plus any Bolt bytes already read past the
/// classification point; they belong to the handshake and must be replayed.
pub async fn establish(
    stream: BoxedStream,
    tls: Option<&TlsAcceptor>,
) -> BoltResult<(Transport, BytesMut)> {
    let mut stream = stream;
    let mut secure = false;
    let mut buf = BytesMut::with_capacity(64);

    loop {
        while classify(&buf) == Classification::Partial {
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(HandshakeError::ConnectionClosed.into());
            }
        }

        match classify(&buf) {
            Classification::Tls => {
                let Some(acceptor) = tls.filter(|_| !secure) else {
                    return Err(BoltError::Tls(if secure {
                        "TLS inside TLS".to_string()
                    } else {
                        "TLS is not enabled on this server".to_string()
                    }));
                };
                let prefix = buf.split().freeze();
                let tls_stream = acceptor
                    .accept(Rewind::new(prefix, stream))
                    .await
                    .map_err(|e| BoltError::Tls(e.to_string()))?;
                debug!("TLS established");
                stream = Box::new(tls_stream);
                secure = true;
            }
            Classification::WebSocket => {
                let prefix = buf.split().freeze();
                let ws = websocket::accept(Box::new(Rewind::new(prefix, stream))).await?;
                debug!(secure, "WebSocket upgrade complete");
                let (reader, writer) = websocket::split(ws);
                return Ok((
                    Transport::WebSocket {
                        reader,
                        writer,
                        secure,
                    },
                    BytesMut::new(),
                ));
            }
            Classification::Bolt => return Ok((Transport::Stream { stream, secure }, buf)),
            Classification::Unknown | Classification::Partial => {
                let mut preamble = [0u8; 4];
                preamble.copy_from_slice(&buf[..4]);
                return Err(HandshakeError::UnknownTransport(preamble).into());
            }
        }
    }
}

/// Inbound half of a transport.
pub enum TransportReader {
    Stream(ReadHalf<BoxedStream>),
    WebSocket(WebSocketReader),
}

impl TransportReader {
    /// Append available bytes to `buf`; `Ok(0)` at end of stream.
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> BoltResult<usize> {
        match self {
            TransportReader::Stream(read) => Ok(read.read_buf(buf).await?),
            TransportReader::WebSocket(ws) => ws.read_buf(buf).await,
        }
    }
}

/// Outbound half of a transport.
pub enum TransportWriter {
    Stream(WriteHalf<BoxedStream>),
    WebSocket(WebSocketWriter),
}

impl TransportWriter {
    /// Write and flush `data`.
    pub async fn write_all(&mut self, data: Bytes) -> BoltResult<()> {
        match self {
            TransportWriter::Stream(write) => {
                write.write_all(&data).await?;
                write.flush().await?;
                Ok(())
            }
            TransportWriter::WebSocket(ws) => ws.write_all(data).await,
        }
    }

    pub async fn shutdown(&mut self) -> BoltResult<()> {
        match self {
            TransportWriter::Stream(write) => Ok(write.shutdown().await?),
            TransportWriter::WebSocket(ws) => ws.shutdown().await,
        }
    }
}
