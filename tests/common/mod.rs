#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use zeta4g_bolt_server::bolt::handshake::build_client_handshake;
use zeta4g_bolt_server::bolt::message::{BeginMessage, BoltRequest, BoltResponse, HelloMessage};
use zeta4g_bolt_server::bolt::state::{ExecResult, RecordBuffer, ResultStream, TransactionContext};
use zeta4g_bolt_server::bolt::{ChunkCodec, PackStreamCodec};
use zeta4g_bolt_server::{
    BoltErrorCode, BoltServer, ExecutionError, PackStreamValue, ProtocolRegistry, ProtocolVersion,
    QueryExecutor, ServerConfig,
};

/// Calls seen by every executor the server created.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Tiny engine: `RETURN <n>` and `UNWIND <n>`, anything else is a syntax error.
pub struct MemoryEngine {
    journal: Journal,
    in_tx: bool,
    commits: usize,
}

impl MemoryEngine {
    fn log(&self, call: impl Into<String>) {
        self.journal.lock().push(call.into());
    }
}

impl QueryExecutor for MemoryEngine {
    fn run(
        &mut self,
        statement: &str,
        _parameters: &HashMap<String, PackStreamValue>,
        context: TransactionContext,
    ) -> ExecResult<Box<dyn ResultStream>> {
        self.log(format!("run {}", statement));
        let buffer = if let Some(n) = statement.strip_prefix("RETURN ") {
            let value: i64 = n
                .parse()
                .map_err(|_| ExecutionError::new(BoltErrorCode::SYNTAX_ERROR, "bad literal"))?;
            RecordBuffer::new(vec![n.to_string()], vec![vec![PackStreamValue::Integer(value)]])
        } else if let Some(n) = statement.strip_prefix("UNWIND ") {
            let count: i64 = n
                .parse()
                .map_err(|_| ExecutionError::new(BoltErrorCode::SYNTAX_ERROR, "bad literal"))?;
            let rows = (0..count).map(|i| vec![PackStreamValue::Integer(i)]).collect();
            RecordBuffer::new(vec!["x".to_string()], rows)
        } else {
            return Err(ExecutionError::new(BoltErrorCode::SYNTAX_ERROR, "Invalid input"));
        };
        Ok(match context {
            TransactionContext::AutoCommit => Box::new(buffer.with_bookmark("bm:auto")),
            TransactionContext::Explicit => Box::new(buffer),
        })
    }

    fn begin(&mut self, _begin: &BeginMessage) -> ExecResult<()> {
        self.log("begin");
        self.in_tx = true;
        Ok(())
    }

    fn commit(&mut self) -> ExecResult<Option<String>> {
        self.log("commit");
        self.in_tx = false;
        self.commits += 1;
        Ok(Some(format!("bm:tx:{}", self.commits)))
    }

    fn rollback(&mut self) -> ExecResult<()> {
        self.log("rollback");
        self.in_tx = false;
        Ok(())
    }

    fn reset(&mut self) -> ExecResult<()> {
        if self.in_tx {
            self.log("rollback");
            self.in_tx = false;
        }
        self.log("reset");
        Ok(())
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub journal: Journal,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(versions: &[ProtocolVersion]) -> Self {
        Self::start_with(versions, ServerConfig::builder()).await
    }

    pub async fn start_with(
        versions: &[ProtocolVersion],
        config: zeta4g_bolt_server::ServerConfigBuilder,
    ) -> Self {
        let journal: Journal = Arc::default();
        let shared = Arc::clone(&journal);
        let mut registry = ProtocolRegistry::with_defaults(Arc::new(
            move |_: &str| -> Box<dyn QueryExecutor> {
                Box::new(MemoryEngine {
                    journal: Arc::clone(&shared),
                    in_tx: false,
                    commits: 0,
                })
            },
        ));
        registry.retain(versions);

        let config = config
            .listen_address("127.0.0.1:0")
            .server_agent("Zeta4G/test")
            .build();
        let server = BoltServer::bind(config, registry).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            journal,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await.unwrap();
    }
}

/// Minimal Bolt client over any byte stream.
pub struct BoltClient<S> {
    framed: Framed<S, ChunkCodec>,
    codec: PackStreamCodec,
}

impl<S: AsyncRead + AsyncWrite + Unpin> BoltClient<S> {
    /// Send the preamble; `None` when the server rejected every version.
    pub async fn handshake(mut stream: S, versions: &[u32]) -> Option<Self> {
        stream.write_all(&build_client_handshake(versions)).await.unwrap();
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await.unwrap();
        let version = u32::from_be_bytes(reply);
        if version == 0 {
            return None;
        }
        Some(Self {
            framed: Framed::new(stream, ChunkCodec::new()),
            codec: PackStreamCodec::new(ProtocolVersion::from_u32(version)),
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.codec.version()
    }

    pub async fn send(&mut self, request: BoltRequest) {
        let payload = self.codec.encode_request(&request).unwrap();
        self.framed.send(payload).await.unwrap();
    }

    /// Next response, or `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<BoltResponse> {
        let payload = self.framed.next().await?.ok()?;
        Some(self.codec.decode_response(&payload).unwrap())
    }

    pub async fn request(&mut self, request: BoltRequest) -> BoltResponse {
        self.send(request).await;
        self.recv().await.expect("connection closed")
    }

    pub async fn hello(&mut self) -> BoltResponse {
        self.request(BoltRequest::Hello(HelloMessage::new("test-client/1.0")))
            .await
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }
}
