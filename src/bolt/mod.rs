//! # Bolt Protocol Core
//!
//! Server side of the Bolt wire protocol, from the first bytes of a socket
//! up to the per-connection state machine.
//!
//! ## Pipeline
//!
//! ```text
//! transport ─▶ handshake ─▶ chunk codec ─▶ message codec ─▶ state machine
//!    │                                                          │
//!    └──────────◀── chunk codec ◀── message codec ◀── responses ┘
//!                        (gated by the write throttle)
//! ```
//!
//! ## Submodules
//!
//! - [`transport`] - TLS / WebSocket / raw Bolt classification
//! - [`handshake`] - Magic preamble and version negotiation
//! - [`codec`] - Chunk framing
//! - [`message`] - Request and response taxonomy, message codec boundary
//! - [`packstream`] - Value serialization used by the default message codec
//! - [`state`] - Connection state machine and the execution boundary
//! - [`registry`] - Registered protocol versions
//! - [`throttle`] - Output backpressure
//! - [`error`] - Error taxonomy and status codes

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod registry;
pub mod state;
pub mod throttle;
pub mod transport;

pub use codec::{ChunkCodec, ChunkedMessage};
pub use error::{BoltError, BoltErrorCode, BoltResult, ErrorClass, ExecutionError, HandshakeError};
pub use handshake::{
    HandshakeNegotiator, HandshakeOutcome, ProtocolVersion, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE,
    HANDSHAKE_SIZE,
};
pub use message::{
    AccessMode, AuthToken, BeginMessage, BoltRequest, BoltResponse, FailureMessage, HelloMessage,
    MessageCodec, MessageKind, PackStreamCodec, RecordMessage, RunMessage, SuccessMessage,
};
pub use packstream::{PackStreamError, PackStreamStructure, PackStreamValue};
pub use registry::{BoltProtocol, ProtocolRegistry};
pub use state::{
    ConnectionStateMachine, ExecResult, ExecutorFactory, InterruptSignal, MessageRules,
    QueryExecutor, RecordBuffer, ResultStream, State, StreamSummary, TransactionContext,
};
pub use throttle::{ThrottleConfig, WriteThrottle};
pub use transport::{classify, Classification, TlsConfig};
