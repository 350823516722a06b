//! Bolt protocol error types.
//!
//! Every failure on a connection falls into one [`ErrorClass`]:
//!
//! | Class | Examples | Effect |
//! |-------|----------|--------|
//! | `ClientProtocolViolation` | bad magic, no common version, illegal message | fatal, at most one FAILURE |
//! | `RecoverableExecution` | query or transaction failure | FAILURE, state `Failed`, cleared by RESET |
//! | `ThrottleTimeout` | peer not draining output | fatal after one grace FAILURE |
//! | `TransportFailure` | I/O error, reset by peer | fatal, nothing written |
//!
//! "Not enough bytes yet" is never an error: decoders return `Ok(None)` and
//! the handshake reports [`HandshakeOutcome::PartialHandshake`](crate::bolt::handshake::HandshakeOutcome).

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::message::FailureMessage;
use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Bolt protocol errors.
#[derive(Debug, Error)]
pub enum BoltError {
    /// I/O error on the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Handshake error
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// PackStream decoding or encoding error
    #[error("PackStream error: {0}")]
    PackStream(#[from] PackStreamError),

    /// Message not allowed in the current state or for this version
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Message decoded but its layout is wrong (missing or mistyped fields)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Reassembled message exceeds the configured limit
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Peer stopped draining output for longer than allowed
    #[error("Write throttle held for {waited:?} (max: {max:?})")]
    ThrottleTimeout { waited: Duration, max: Duration },

    /// Query engine failure
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// TLS setup or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// WebSocket transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Internal task failure
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error taxonomy of the connection core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad magic, unsupported version, malformed or illegal message
    ClientProtocolViolation,
    /// Query or transaction failure; the connection stays open
    RecoverableExecution,
    /// Peer not draining output
    ThrottleTimeout,
    /// Transport is gone; nothing can be written
    TransportFailure,
    /// Server misconfiguration, raised before any connection exists
    Configuration,
}

impl BoltError {
    /// Create a protocol violation error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create an invalid message error.
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            BoltError::Handshake(_)
            | BoltError::PackStream(_)
            | BoltError::ProtocolViolation(_)
            | BoltError::InvalidMessage(_)
            | BoltError::MessageTooLarge { .. } => ErrorClass::ClientProtocolViolation,
            BoltError::Execution(_) => ErrorClass::RecoverableExecution,
            BoltError::ThrottleTimeout { .. } => ErrorClass::ThrottleTimeout,
            BoltError::Configuration(_) => ErrorClass::Configuration,
            BoltError::Io(_)
            | BoltError::Tls(_)
            | BoltError::WebSocket(_)
            | BoltError::Timeout(_)
            | BoltError::ConnectionClosed
            | BoltError::Internal(_) => ErrorClass::TransportFailure,
        }
    }

    /// Whether the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        self.class() != ErrorClass::RecoverableExecution
    }

    /// Whether a last FAILURE may still be written before closing.
    pub fn allows_failure_response(&self) -> bool {
        match self.class() {
            ErrorClass::ClientProtocolViolation => !matches!(self, BoltError::Handshake(_)),
            ErrorClass::RecoverableExecution | ErrorClass::ThrottleTimeout => true,
            ErrorClass::TransportFailure | ErrorClass::Configuration => false,
        }
    }

    /// Convert error to a FAILURE message.
    pub fn to_failure(&self) -> FailureMessage {
        match self {
            BoltError::ProtocolViolation(msg) => {
                FailureMessage::new(BoltErrorCode::REQUEST_INVALID, msg)
            }
            BoltError::InvalidMessage(_)
            | BoltError::PackStream(_)
            | BoltError::MessageTooLarge { .. } => {
                FailureMessage::new(BoltErrorCode::INVALID_FORMAT, &self.to_string())
            }
            BoltError::ThrottleTimeout { .. } => {
                FailureMessage::new(BoltErrorCode::WRITE_THROTTLED, &self.to_string())
            }
            BoltError::Execution(e) => FailureMessage::new(&e.code, &e.message),
            _ => FailureMessage::new(BoltErrorCode::GENERAL_ERROR, &self.to_string()),
        }
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// First four bytes are not the Bolt preamble
    #[error("Invalid magic number: expected {expected:02X?}, received {received:02X?}")]
    InvalidMagic { expected: [u8; 4], received: [u8; 4] },

    /// None of the proposed versions is registered
    #[error("No compatible protocol version in {proposed:08X?}")]
    NoCompatibleVersion { proposed: [u32; 4] },

    /// Plaintext handshake while encryption is required
    #[error("Encryption is required but the connection is not encrypted")]
    Insecure,

    /// First bytes match no known transport
    #[error("Unrecognised transport preamble {0:02X?}")]
    UnknownTransport([u8; 4]),

    /// Connection closed during handshake
    #[error("Connection closed during handshake")]
    ConnectionClosed,
}

/// Failure reported by the query engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ExecutionError {
    /// Status code, e.g. `Neo.ClientError.Statement.SyntaxError`
    pub code: String,
    /// Human readable message
    pub message: String,
}

/// Status code classification (second segment of the code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Client mistake; retrying the same request will fail again
    ClientError,
    /// Temporary condition; retrying may succeed
    TransientError,
    /// Server-side failure
    DatabaseError,
}

impl ExecutionError {
    /// Create an execution error with an explicit status code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error raised when a stream is cut short by an interrupt.
    pub fn terminated() -> Self {
        Self::new(
            BoltErrorCode::TRANSACTION_TERMINATED,
            "The transaction has been terminated by an interrupt",
        )
    }

    /// Classification derived from the status code. Unknown codes count as
    /// database errors.
    pub fn classification(&self) -> ErrorClassification {
        match self.code.split('.').nth(1) {
            Some("ClientError") => ErrorClassification::ClientError,
            Some("TransientError") => ErrorClassification::TransientError,
            _ => ErrorClassification::DatabaseError,
        }
    }
}

/// Bolt status code constants.
pub struct BoltErrorCode;

impl BoltErrorCode {
    // Protocol errors
    pub const REQUEST_INVALID: &'static str = "Neo.ClientError.Request.Invalid";
    pub const INVALID_FORMAT: &'static str = "Neo.ClientError.Request.InvalidFormat";

    // Client errors (recoverable)
    pub const SYNTAX_ERROR: &'static str = "Neo.ClientError.Statement.SyntaxError";
    pub const SEMANTIC_ERROR: &'static str = "Neo.ClientError.Statement.SemanticError";
    pub const PARAMETER_MISSING: &'static str = "Neo.ClientError.Statement.ParameterMissing";
    pub const TRANSACTION_NOT_FOUND: &'static str =
        "Neo.ClientError.Transaction.TransactionNotFound";

    // Database errors
    pub const GENERAL_ERROR: &'static str = "Neo.DatabaseError.General.UnknownError";
    pub const EXECUTION_FAILED: &'static str = "Neo.DatabaseError.Statement.ExecutionFailed";

    // Transient errors (retry may succeed)
    pub const TRANSACTION_TERMINATED: &'static str =
        "Neo.TransientError.Transaction.Terminated";
    pub const WRITE_THROTTLED: &'static str = "Neo.TransientError.Request.WriteThrottled";
    pub const DEADLOCK_DETECTED: &'static str = "Neo.TransientError.Transaction.DeadlockDetected";
}
