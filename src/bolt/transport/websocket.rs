//! Bolt over WebSocket.
//!
//! After the HTTP upgrade, Bolt bytes travel in binary frames. Frame
//! boundaries carry no meaning: a chunk may span frames and a frame may
//! hold several chunks.

use bytes::{Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use super::BoxedStream;
use crate::bolt::{BoltError, BoltResult};

pub(crate) type WsStream = WebSocketStream<BoxedStream>;

/// Complete the server side of the upgrade.
pub(crate) async fn accept(stream: BoxedStream) -> BoltResult<WsStream> {
    Ok(tokio_tungstenite::accept_async(stream).await?)
}

/// Inbound half.
pub struct WebSocketReader {
    inner: SplitStream<WsStream>,
}

/// Outbound half.
pub struct WebSocketWriter {
    inner: SplitSink<WsStream, Message>,
}

pub(crate) fn split(ws: WsStream) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = ws.split();
    (WebSocketReader { inner: stream }, WebSocketWriter { inner: sink })
}

impl WebSocketReader {
    /// Append the next binary payload to `buf`; `Ok(0)` at end of stream.
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> BoltResult<usize> {
        loop {
            let Some(message) = self.inner.next().await else {
                return Ok(0);
            };
            match message? {
                Message::Binary(data) => {
                    if data.is_empty() {
                        continue;
                    }
                    buf.extend_from_slice(&data);
                    return Ok(data.len());
                }
                Message::Text(_) => {
                    return Err(BoltError::protocol("Text frames are not valid on a Bolt connection"));
                }
                Message::Close(frame) => {
                    debug!(?frame, "websocket close frame");
                    return Ok(0);
                }
                // Pongs are queued by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

impl WebSocketWriter {
    /// Send one binary frame.
    pub async fn write_all(&mut self, data: Bytes) -> BoltResult<()> {
        self.inner.send(Message::binary(data)).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> BoltResult<()> {
        match self.inner.close().await {
            Ok(()) | Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
