//! Per-connection worker.
//!
//! A worker takes one accepted byte stream through transport
//! classification and the version handshake, then runs three cooperating
//! tasks until the connection ends:
//!
//! - the **reader** decodes chunks into requests and queues them, raising
//!   the interrupt signal as soon as a RESET is decoded;
//! - the **worker loop** dispatches one request at a time to the state
//!   machine on a blocking thread and frames every response, waiting on
//!   the write throttle before each one;
//! - the **writer** drains framed bytes to the transport and reports them
//!   flushed to the throttle.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Decoder;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::config::ServerConfig;
use super::connection::Connection;
use crate::bolt::message::{BoltRequest, BoltResponse, MessageCodec, MessageKind};
use crate::bolt::state::{InterruptSignal, Outcome, ResponseHandler};
use crate::bolt::transport::{self, BoxedStream, ByteStream, TransportReader, TransportWriter};
use crate::bolt::{
    BoltError, BoltResult, ChunkCodec, ErrorClass, HandshakeError, HandshakeNegotiator,
    HandshakeOutcome, ProtocolRegistry, WriteThrottle,
};

/// Responses buffered between the dispatch thread and the worker loop.
const RESPONSE_QUEUE: usize = 32;

/// Item handed from the reader to the worker loop.
#[derive(Debug)]
enum Inbound {
    Request(BoltRequest),
    /// Undecodable input or a transport error; the reader has stopped
    Failed(BoltError),
}

/// Drives one client connection from its first byte to its close.
pub struct ConnectionWorker {
    id: String,
    peer: String,
    config: Arc<ServerConfig>,
    registry: Arc<ProtocolRegistry>,
    tls: Option<TlsAcceptor>,
}

impl ConnectionWorker {
    pub fn new(
        id: impl Into<String>,
        peer: impl Into<String>,
        config: Arc<ServerConfig>,
        registry: Arc<ProtocolRegistry>,
        tls: Option<TlsAcceptor>,
    ) -> Self {
        Self {
            id: id.into(),
            peer: peer.into(),
            config,
            registry,
            tls,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Serve `stream` until the client leaves or the connection fails.
    ///
    /// Every event of the connection is recorded inside a
    /// `bolt_connection` span carrying its id and peer address.
    pub async fn run<S: ByteStream + 'static>(self, stream: S) -> BoltResult<()> {
        let span = info_span!("bolt_connection", id = %self.id, peer = %self.peer);
        self.serve(Box::new(stream)).instrument(span).await
    }

    async fn serve(self, stream: BoxedStream) -> BoltResult<()> {
        let timeout = self.config.handshake_timeout;
        let session = match tokio::time::timeout(timeout, self.negotiate(stream)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                info!(error = %e, "connection rejected");
                return Err(e);
            }
            Err(_) => {
                warn!(?timeout, "handshake timed out");
                return Err(BoltError::Timeout(format!(
                    "handshake not completed within {:?}",
                    timeout
                )));
            }
        };
        session.run().await
    }

    /// Classify the transport, negotiate a version and start the I/O tasks.
    async fn negotiate(&self, stream: BoxedStream) -> BoltResult<Session> {
        let (transport, mut buf) = transport::establish(stream, self.tls.as_ref()).await?;
        let kind = transport.kind();
        debug!(transport = kind, "transport classified");

        let mut negotiator = HandshakeNegotiator::new(self.registry.versions())
            .require_encryption(self.config.encryption.requires_tls())
            .secure(transport.is_secure());
        let (mut reader, mut writer) = transport.split();

        let outcome = loop {
            let outcome = negotiator.accumulate(&mut buf);
            if outcome.is_complete() {
                break outcome;
            }
            if reader.read_buf(&mut buf).await? == 0 {
                return Err(HandshakeError::ConnectionClosed.into());
            }
        };

        if let Some(reply) = outcome.reply() {
            writer.write_all(Bytes::copy_from_slice(&reply)).await?;
        }
        let HandshakeOutcome::ProtocolChosen(version) = outcome else {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "shutdown after rejected handshake failed");
            }
            let error = negotiator.error().unwrap_or(HandshakeError::ConnectionClosed);
            return Err(error.into());
        };

        let signal = InterruptSignal::new();
        let (codec, machine) = self
            .registry
            .instantiate(version, &self.id, &self.config.server_agent, signal.clone())
            .ok_or_else(|| BoltError::Internal(format!("negotiated version {} is not registered", version)))?;
        info!(%version, transport = kind, "handshake complete");

        let throttle = Arc::new(WriteThrottle::new(self.config.throttle.clone()));
        let connection = Connection::new(
            self.id.as_str(),
            self.peer.as_str(),
            kind,
            Arc::clone(&codec),
            self.chunk_codec(),
            machine,
            Arc::clone(&throttle),
        );

        let (inbound_tx, inbound) = mpsc::channel(self.config.inbound_queue_capacity);
        let requests = RequestReader {
            reader,
            buf,
            chunks: self.chunk_codec(),
            codec,
            signal,
            inbound: inbound_tx,
            lookahead: self.config.inbound_queue_capacity,
        };
        let reader = TaskGuard(tokio::spawn(requests.run().in_current_span()));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = TaskGuard(tokio::spawn(
            write_responses(writer, outbound_rx, throttle).in_current_span(),
        ));

        Ok(Session {
            connection,
            config: Arc::clone(&self.config),
            inbound,
            outbound,
            reader,
            writer,
        })
    }

    fn chunk_codec(&self) -> ChunkCodec {
        ChunkCodec::with_limits(self.config.max_message_size, self.config.max_chunk_size)
    }
}

/// A negotiated connection and its I/O tasks.
struct Session {
    connection: Connection,
    config: Arc<ServerConfig>,
    inbound: mpsc::Receiver<Inbound>,
    outbound: mpsc::UnboundedSender<Bytes>,
    reader: TaskGuard<()>,
    writer: TaskGuard<BoltResult<()>>,
}

/// Aborts the I/O task when the session goes away, including on panic.
struct TaskGuard<T>(JoinHandle<T>);

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Session {
    async fn run(mut self) -> BoltResult<()> {
        let result = self.process_messages().await;
        self.shutdown().await;
        result
    }

    async fn process_messages(&mut self) -> BoltResult<()> {
        while let Some(inbound) = self.inbound.recv().await {
            let request = match inbound {
                Inbound::Request(request) => request,
                Inbound::Failed(error) => return Err(self.fail(error).await),
            };
            debug!(message = request.name(), "message received");

            match self.dispatch(request).await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Disconnect) => {
                    debug!("client said goodbye");
                    return Ok(());
                }
                // The state machine has already answered
                Ok(Outcome::Fatal(error)) => return Err(error),
                Err(error) => return Err(self.fail(error).await),
            }
        }
        debug!("client closed the connection");
        Ok(())
    }

    /// Run one request through the state machine.
    ///
    /// Dispatch happens on a blocking thread; its responses are framed and
    /// throttled here as they arrive, so a long result stream is written
    /// while it is still being produced.
    async fn dispatch(&mut self, request: BoltRequest) -> BoltResult<Outcome> {
        let (tx, mut rx) = mpsc::channel(RESPONSE_QUEUE);
        let machine = Arc::clone(self.connection.machine());
        let span = Span::current();
        let task = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let mut sink = ResponseSink { tx };
            machine.lock().process(request, &mut sink)
        });

        let mut failure = None;
        while let Some(response) = rx.recv().await {
            if let Err(error) = self.send(&response).await {
                failure = Some(error);
                break;
            }
        }
        // Unblocks the dispatch thread if we stopped early
        drop(rx);

        let outcome = task
            .await
            .map_err(|e| BoltError::Internal(format!("dispatch task failed: {}", e)))?;
        match failure {
            Some(error) => Err(error),
            None => Ok(outcome),
        }
    }

    /// Encode, wait for the throttle, frame and queue one response.
    async fn send(&self, response: &BoltResponse) -> BoltResult<()> {
        let payload = self.connection.codec().encode(response)?;
        let throttle = self.connection.throttle();

        tokio::select! {
            acquired = throttle.acquire() => acquired?,
            _ = self.outbound.closed() => return Err(BoltError::ConnectionClosed),
        }

        let budget = self.config.output_buffer_size;
        let mut message = self.connection.chunks().chunked(payload);
        while !message.is_complete() {
            let mut buf = BytesMut::with_capacity(message.remaining().min(budget));
            message.write_into(&mut buf, budget);
            throttle.queued(buf.len());
            self.outbound
                .send(buf.freeze())
                .map_err(|_| BoltError::ConnectionClosed)?;
        }
        Ok(())
    }

    /// Report a fatal error to the client when the error class allows it.
    async fn fail(&mut self, error: BoltError) -> BoltError {
        match error.class() {
            ErrorClass::TransportFailure => debug!(error = %error, "transport failed"),
            class => warn!(error = %error, ?class, "closing connection"),
        }
        if error.allows_failure_response() {
            let failure = BoltResponse::Failure(error.to_failure());
            if let Err(e) = self.send(&failure).await {
                debug!(error = %e, "final FAILURE not delivered");
            }
        }
        error
    }

    /// Release everything exactly once: session state, reader, writer.
    async fn shutdown(self) {
        let Session {
            mut connection,
            config,
            outbound,
            reader,
            mut writer,
            ..
        } = self;

        connection.close();
        drop(reader);
        drop(outbound);

        match tokio::time::timeout(config.close_flush_timeout, &mut writer.0).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(error = %e, "writer stopped with an error"),
            Ok(Err(e)) => debug!(error = %e, "writer task failed"),
            Err(_) => {
                warn!(timeout = ?config.close_flush_timeout, "pending output not flushed, dropping it");
            }
        }
        drop(writer);
        info!(state = %connection.state(), "connection closed");
    }
}

/// Hands responses from the dispatch thread to the worker loop.
struct ResponseSink {
    tx: mpsc::Sender<BoltResponse>,
}

impl ResponseHandler for ResponseSink {
    fn on_response(&mut self, response: BoltResponse) -> BoltResult<()> {
        self.tx
            .blocking_send(response)
            .map_err(|_| BoltError::ConnectionClosed)
    }
}

/// Reader task: transport bytes to queued requests.
///
/// When the worker falls behind and the queue is full, the reader keeps
/// decoding up to `lookahead` further requests so a pipelined RESET still
/// raises the interrupt signal without waiting for its turn in the queue.
struct RequestReader {
    reader: TransportReader,
    /// Starts with the bytes that arrived with the handshake
    buf: BytesMut,
    chunks: ChunkCodec,
    codec: Arc<dyn MessageCodec>,
    signal: InterruptSignal,
    inbound: mpsc::Sender<Inbound>,
    lookahead: usize,
}

impl RequestReader {
    async fn run(mut self) {
        let mut pending: VecDeque<Inbound> = VecDeque::new();
        // End of input or a failure has been decoded; nothing more to read
        let mut done = false;

        loop {
            while let Some(item) = pending.pop_front() {
                match self.inbound.try_send(item) {
                    Ok(()) => {}
                    Err(TrySendError::Full(item)) => {
                        pending.push_front(item);
                        break;
                    }
                    Err(TrySendError::Closed(_)) => return,
                }
            }

            if done || pending.len() >= self.lookahead {
                let Some(item) = pending.pop_front() else { return };
                if self.inbound.send(item).await.is_err() {
                    return;
                }
                continue;
            }

            match self.chunks.decode(&mut self.buf) {
                Ok(Some(payload)) => {
                    let item = self.admit(self.codec.decode(&payload));
                    done = matches!(item, Inbound::Failed(_));
                    pending.push_back(item);
                }
                Ok(None) if pending.is_empty() => {
                    let read = self.reader.read_buf(&mut self.buf).await;
                    done = self.after_read(read, &mut pending);
                }
                Ok(None) => {
                    // Queue full: read ahead until the worker makes room
                    tokio::select! {
                        permit = self.inbound.reserve() => match permit {
                            Ok(permit) => {
                                if let Some(item) = pending.pop_front() {
                                    permit.send(item);
                                }
                            }
                            Err(_) => return,
                        },
                        read = self.reader.read_buf(&mut self.buf) => {
                            done = self.after_read(read, &mut pending);
                        }
                    }
                }
                Err(e) => {
                    pending.push_back(Inbound::Failed(e));
                    done = true;
                }
            }
        }
    }

    /// Raise the interrupt for a RESET before it is queued.
    fn admit(&self, decoded: BoltResult<BoltRequest>) -> Inbound {
        match decoded {
            Ok(request) => {
                if request.kind() == MessageKind::Reset {
                    self.signal.raise();
                }
                Inbound::Request(request)
            }
            Err(error) => Inbound::Failed(error),
        }
    }

    /// Whether the read ended the input.
    fn after_read(&self, read: BoltResult<usize>, pending: &mut VecDeque<Inbound>) -> bool {
        match read {
            Ok(0) => {
                if self.chunks.in_message() || !self.buf.is_empty() {
                    debug!(pending = self.buf.len(), "client closed mid-message");
                }
                true
            }
            Ok(_) => false,
            Err(e) => {
                pending.push_back(Inbound::Failed(e));
                true
            }
        }
    }
}

/// Writer task: framed bytes to the transport.
async fn write_responses(
    mut writer: TransportWriter,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    throttle: Arc<WriteThrottle>,
) -> BoltResult<()> {
    while let Some(bytes) = outbound.recv().await {
        let len = bytes.len();
        writer.write_all(bytes).await?;
        throttle.flushed(len);
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio_util::codec::{Encoder, Framed};

    use super::*;
    use crate::bolt::handshake::build_client_handshake;
    use crate::bolt::message::{BeginMessage, HelloMessage, RunMessage};
    use crate::bolt::state::testing::{Journal, ScriptedExecutor};
    use crate::bolt::state::QueryExecutor;
    use crate::bolt::{BoltErrorCode, PackStreamCodec, PackStreamValue, ProtocolVersion, ThrottleConfig};

    type Journals = Arc<Mutex<Vec<Arc<Mutex<Journal>>>>>;

    fn registry(versions: &[ProtocolVersion]) -> (ProtocolRegistry, Journals) {
        let journals: Journals = Arc::default();
        let shared = Arc::clone(&journals);
        let factory = move |_: &str| -> Box<dyn QueryExecutor> {
            let (executor, journal) = ScriptedExecutor::new();
            shared.lock().push(journal);
            Box::new(executor)
        };
        let mut registry = ProtocolRegistry::with_defaults(Arc::new(factory));
        registry.retain(versions);
        (registry, journals)
    }

    fn spawn_worker(
        registry: ProtocolRegistry,
        config: ServerConfig,
        buffer: usize,
    ) -> (DuplexStream, JoinHandle<BoltResult<()>>) {
        let (client, server) = tokio::io::duplex(buffer);
        let worker = ConnectionWorker::new("bolt-1", "duplex", Arc::new(config), Arc::new(registry), None);
        (client, tokio::spawn(worker.run(server)))
    }

    struct Client {
        framed: Framed<DuplexStream, ChunkCodec>,
        codec: PackStreamCodec,
    }

    impl Client {
        async fn handshake(mut stream: DuplexStream, versions: &[u32]) -> (Self, [u8; 4]) {
            stream.write_all(&build_client_handshake(versions)).await.unwrap();
            let mut reply = [0u8; 4];
            stream.read_exact(&mut reply).await.unwrap();
            let version = ProtocolVersion::from_u32(u32::from_be_bytes(reply));
            let client = Client {
                framed: Framed::new(stream, ChunkCodec::new()),
                codec: PackStreamCodec::new(version),
            };
            (client, reply)
        }

        async fn send(&mut self, request: BoltRequest) {
            let payload = self.codec.encode_request(&request).unwrap();
            self.framed.send(payload).await.unwrap();
        }

        async fn recv(&mut self) -> Option<BoltResponse> {
            let payload = self.framed.next().await?.ok()?;
            Some(self.codec.decode_response(&payload).unwrap())
        }

        async fn hello(&mut self) -> BoltResponse {
            self.send(BoltRequest::Hello(HelloMessage::new("test/1.0"))).await;
            self.recv().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_handshake_hello_and_query() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let (stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        let (mut client, reply) = Client::handshake(stream, &[3, 2, 1, 0]).await;
        assert_eq!(reply, [0, 0, 0, 3]);

        let BoltResponse::Success(hello) = client.hello().await else {
            panic!("expected SUCCESS for HELLO");
        };
        assert_eq!(hello.connection_id(), Some("bolt-1"));
        assert!(hello.server().is_some());

        client.send(BoltRequest::Run(RunMessage::new("RETURN 1"))).await;
        client.send(BoltRequest::PullAll).await;

        let BoltResponse::Success(run) = client.recv().await.unwrap() else {
            panic!("expected SUCCESS for RUN");
        };
        assert_eq!(run.fields(), Some(vec!["1".to_string()]));
        let BoltResponse::Record(record) = client.recv().await.unwrap() else {
            panic!("expected RECORD");
        };
        assert_eq!(record.fields, vec![PackStreamValue::Integer(1)]);
        let BoltResponse::Success(pull) = client.recv().await.unwrap() else {
            panic!("expected SUCCESS for PULL_ALL");
        };
        assert_eq!(pull.bookmark(), Some("bm:auto"));

        drop(client);
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_no_applicable_protocol() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let (stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        let (mut client, reply) = Client::handshake(stream, &[9, 8, 7, 6]).await;
        assert_eq!(reply, [0, 0, 0, 0]);
        assert!(client.recv().await.is_none());

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            BoltError::Handshake(HandshakeError::NoCompatibleVersion { proposed: [9, 8, 7, 6] })
        ));
    }

    #[tokio::test]
    async fn test_bytes_after_handshake_are_replayed() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let (mut stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        // Handshake and HELLO in a single write
        let codec = PackStreamCodec::new(ProtocolVersion::V3);
        let mut bytes = BytesMut::from(&build_client_handshake(&[3])[..]);
        let hello = codec
            .encode_request(&BoltRequest::Hello(HelloMessage::new("test/1.0")))
            .unwrap();
        ChunkCodec::new().encode(hello, &mut bytes).unwrap();
        stream.write_all(&bytes).await.unwrap();

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0, 0, 0, 3]);

        let mut framed = Framed::new(stream, ChunkCodec::new());
        let payload = framed.next().await.unwrap().unwrap();
        assert!(codec.decode_response(&payload).unwrap().is_success());

        drop(framed);
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_goodbye_rolls_back_without_response() {
        let (registry, journals) = registry(&[ProtocolVersion::V3]);
        let (stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        let (mut client, _) = Client::handshake(stream, &[3]).await;
        assert!(client.hello().await.is_success());
        client.send(BoltRequest::Begin(BeginMessage::new())).await;
        assert!(client.recv().await.unwrap().is_success());

        client.send(BoltRequest::Goodbye).await;
        assert!(client.recv().await.is_none());
        worker.await.unwrap().unwrap();

        let journal = Arc::clone(&journals.lock()[0]);
        let calls = journal.lock().calls.clone();
        assert_eq!(&calls[calls.len() - 2..], &["rollback", "reset"]);
    }

    #[tokio::test]
    async fn test_illegal_message_is_fatal() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let (stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        let (mut client, _) = Client::handshake(stream, &[3]).await;
        // RUN before HELLO
        client.send(BoltRequest::Run(RunMessage::new("RETURN 1"))).await;

        let BoltResponse::Failure(failure) = client.recv().await.unwrap() else {
            panic!("expected FAILURE");
        };
        assert_eq!(failure.code, BoltErrorCode::REQUEST_INVALID);
        assert!(client.recv().await.is_none());
        assert!(matches!(worker.await.unwrap(), Err(BoltError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_failure_then_reset() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let (stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        let (mut client, _) = Client::handshake(stream, &[3]).await;
        assert!(client.hello().await.is_success());

        client.send(BoltRequest::Run(RunMessage::new("NOT CYPHER"))).await;
        let BoltResponse::Failure(failure) = client.recv().await.unwrap() else {
            panic!("expected FAILURE");
        };
        assert_eq!(failure.code, BoltErrorCode::SYNTAX_ERROR);

        client.send(BoltRequest::PullAll).await;
        assert_eq!(client.recv().await.unwrap(), BoltResponse::Ignored);

        client.send(BoltRequest::Reset).await;
        assert!(client.recv().await.unwrap().is_success());

        client.send(BoltRequest::Run(RunMessage::new("RETURN 2"))).await;
        assert!(client.recv().await.unwrap().is_success());

        drop(client);
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let (stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        let (mut client, _) = Client::handshake(stream, &[3]).await;
        assert!(client.hello().await.is_success());
        client.framed.send(Bytes::new()).await.unwrap();

        let BoltResponse::Failure(failure) = client.recv().await.unwrap() else {
            panic!("expected FAILURE");
        };
        assert_eq!(failure.code, BoltErrorCode::INVALID_FORMAT);
        assert!(client.recv().await.is_none());
        assert!(matches!(worker.await.unwrap(), Err(BoltError::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let config = ServerConfig::builder().max_message_size(128).build();
        let (stream, worker) = spawn_worker(registry, config, 4096);

        let (mut client, _) = Client::handshake(stream, &[3]).await;
        assert!(client.hello().await.is_success());
        let statement = format!("RETURN {}", "9".repeat(200));
        client.send(BoltRequest::Run(RunMessage::new(&statement))).await;

        let BoltResponse::Failure(failure) = client.recv().await.unwrap() else {
            panic!("expected FAILURE");
        };
        assert_eq!(failure.code, BoltErrorCode::INVALID_FORMAT);
        assert!(matches!(
            worker.await.unwrap(),
            Err(BoltError::MessageTooLarge { max: 128, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let config = ServerConfig::builder()
            .handshake_timeout(Duration::from_secs(2))
            .build();
        let (mut stream, worker) = spawn_worker(registry, config, 4096);

        // Half a preamble, then silence
        stream.write_all(&[0x60, 0x60]).await.unwrap();

        assert!(matches!(worker.await.unwrap(), Err(BoltError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_unknown_transport_closed() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let (mut stream, worker) = spawn_worker(registry, ServerConfig::default(), 4096);

        stream.write_all(b"PING\r\n").await.unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(matches!(
            worker.await.unwrap(),
            Err(BoltError::Handshake(HandshakeError::UnknownTransport(_)))
        ));
    }

    #[tokio::test]
    async fn test_throttle_timeout_sends_one_failure() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let config = ServerConfig::builder()
            .output_buffer_size(64)
            .throttle(
                ThrottleConfig::new(64, 256, Duration::from_millis(100))
                    .with_poll_interval(Duration::from_millis(5)),
            )
            .build();
        // A tiny pipe the client stops draining
        let (stream, worker) = spawn_worker(registry, config, 256);

        let (mut client, _) = Client::handshake(stream, &[3]).await;
        assert!(client.hello().await.is_success());
        client.send(BoltRequest::Run(RunMessage::new("UNWIND 100000"))).await;
        client.send(BoltRequest::PullAll).await;

        // Well past the lock duration, then read everything that was queued
        tokio::time::sleep(Duration::from_millis(600)).await;
        let mut records = 0;
        let mut failures = Vec::new();
        let mut summaries = Vec::new();
        let drained = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(response) = client.recv().await {
                match response {
                    BoltResponse::Record(_) => {
                        assert!(failures.is_empty(), "RECORD after FAILURE");
                        records += 1;
                    }
                    BoltResponse::Failure(failure) => failures.push(failure.code),
                    other => summaries.push(other),
                }
            }
        })
        .await;
        assert!(drained.is_ok(), "connection was not closed");

        assert!(records > 0);
        assert_eq!(failures, vec![BoltErrorCode::WRITE_THROTTLED.to_string()]);
        // Only the RUN success; PULL_ALL never completed
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].is_success());

        let result = tokio::time::timeout(Duration::from_secs(10), worker).await.unwrap();
        assert!(matches!(result.unwrap(), Err(BoltError::ThrottleTimeout { .. })));
    }

    #[tokio::test]
    async fn test_aborted_worker_releases_transport() {
        let (registry, _) = registry(&[ProtocolVersion::V3]);
        let config = ServerConfig::builder().max_message_size(1 << 30).build();
        let (stream, worker) = spawn_worker(registry, config, 4096);

        let (mut client, _) = Client::handshake(stream, &[3]).await;
        assert!(client.hello().await.is_success());

        worker.abort();
        assert!(worker.await.unwrap_err().is_cancelled());

        // An unterminated message: a live reader would keep accepting it
        let mut stream = client.framed.into_inner();
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while stream.write_all(&[0x01; 64]).await.is_ok() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(closed.is_ok(), "transport still open after the worker was aborted");
    }

    #[tokio::test]
    async fn test_task_guard_aborts_on_drop() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let guard = TaskGuard(tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await
        }));

        drop(guard);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_reset_raises_signal_behind_full_queue() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (read, _write) = tokio::io::split(Box::new(server) as BoxedStream);
        let (tx, mut rx) = mpsc::channel(1);
        let signal = InterruptSignal::new();
        let requests = RequestReader {
            reader: TransportReader::Stream(read),
            buf: BytesMut::new(),
            chunks: ChunkCodec::new(),
            codec: Arc::new(PackStreamCodec::new(ProtocolVersion::V3)),
            signal: signal.clone(),
            inbound: tx,
            lookahead: 4,
        };
        let task = tokio::spawn(requests.run());

        let codec = PackStreamCodec::new(ProtocolVersion::V3);
        let mut bytes = BytesMut::new();
        let pipeline = [
            BoltRequest::Run(RunMessage::new("RETURN 1")),
            BoltRequest::Run(RunMessage::new("RETURN 2")),
            BoltRequest::Run(RunMessage::new("RETURN 3")),
            BoltRequest::Reset,
        ];
        for request in &pipeline {
            let payload = codec.encode_request(request).unwrap();
            ChunkCodec::new().encode(payload, &mut bytes).unwrap();
        }
        client.write_all(&bytes).await.unwrap();

        // Nobody is draining the queue, which holds a single request
        let raised = tokio::time::timeout(Duration::from_secs(5), async {
            while !signal.is_raised() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(raised.is_ok(), "RESET was not read ahead");

        let mut kinds = Vec::new();
        for _ in 0..pipeline.len() {
            match rx.recv().await.unwrap() {
                Inbound::Request(request) => kinds.push(request.kind()),
                Inbound::Failed(e) => panic!("unexpected failure: {}", e),
            }
        }
        assert_eq!(
            kinds,
            [MessageKind::Run, MessageKind::Run, MessageKind::Run, MessageKind::Reset]
        );

        drop(client);
        task.await.unwrap();
    }
}
