//! One negotiated client connection.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::bolt::message::MessageCodec;
use crate::bolt::state::{ConnectionStateMachine, InterruptSignal, State};
use crate::bolt::{ChunkCodec, ProtocolVersion, WriteThrottle};

/// Everything a worker owns for one connection after the handshake.
///
/// The state machine sits behind a mutex only so dispatch can run on a
/// blocking thread; the worker never dispatches two messages at once.
pub struct Connection {
    id: String,
    peer: String,
    transport: &'static str,
    version: ProtocolVersion,
    codec: Arc<dyn MessageCodec>,
    chunks: ChunkCodec,
    machine: Arc<Mutex<ConnectionStateMachine>>,
    signal: InterruptSignal,
    throttle: Arc<WriteThrottle>,
    closed: bool,
}

impl Connection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        peer: impl Into<String>,
        transport: &'static str,
        codec: Arc<dyn MessageCodec>,
        chunks: ChunkCodec,
        machine: ConnectionStateMachine,
        throttle: Arc<WriteThrottle>,
    ) -> Self {
        let signal = machine.signal().clone();
        Self {
            id: id.into(),
            peer: peer.into(),
            transport,
            version: machine.version(),
            codec,
            chunks,
            machine: Arc::new(Mutex::new(machine)),
            signal,
            throttle,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// `bolt`, `bolt+tls`, `websocket` or `websocket+tls`.
    pub fn transport(&self) -> &'static str {
        self.transport
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn codec(&self) -> &Arc<dyn MessageCodec> {
        &self.codec
    }

    pub fn chunks(&self) -> &ChunkCodec {
        &self.chunks
    }

    pub fn machine(&self) -> &Arc<Mutex<ConnectionStateMachine>> {
        &self.machine
    }

    /// Interrupt handle shared with the inbound reader.
    pub fn signal(&self) -> &InterruptSignal {
        &self.signal
    }

    pub fn throttle(&self) -> &Arc<WriteThrottle> {
        &self.throttle
    }

    pub fn state(&self) -> State {
        self.machine.lock().state()
    }

    pub fn interrupt_depth(&self) -> usize {
        self.machine.lock().interrupt_depth()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the session: open results are dropped and any open
    /// transaction is rolled back. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.machine.lock().close();
        debug!(connection_id = %self.id, "connection resources released");
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("transport", &self.transport)
            .field("version", &self.version)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
