//! Per-connection protocol state.
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Connected` | version negotiated, waiting for HELLO |
//! | `Ready` | idle, auto-commit |
//! | `Streaming` | auto-commit result open |
//! | `TxReady` | explicit transaction open, idle |
//! | `TxStreaming` | explicit transaction with an open result |
//! | `Failed` | last request failed; waiting for RESET |
//! | `Interrupted` | interrupts pending; one RESET per interrupt |
//! | `Closed` | connection killed; nothing more is dispatched |

mod executor;
mod interrupt;
mod machine;
mod rules;

#[cfg(test)]
pub(crate) use executor::testing;
pub use executor::{
    ExecResult, ExecutorFactory, QueryExecutor, RecordBuffer, ResultStream, StreamSummary,
    TransactionContext,
};
pub use interrupt::InterruptSignal;
pub use machine::{plan, Action, ConnectionStateMachine, Outcome, ResponseHandler, Transition};
pub use rules::MessageRules;

/// Connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Connected,
    Ready,
    Streaming,
    TxReady,
    TxStreaming,
    Failed,
    Interrupted,
    /// Terminal: the connection has been killed
    Closed,
}

impl State {
    /// Every state, in table order.
    pub const ALL: [State; 8] = [
        State::Connected,
        State::Ready,
        State::Streaming,
        State::TxReady,
        State::TxStreaming,
        State::Failed,
        State::Interrupted,
        State::Closed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            State::Connected => "CONNECTED",
            State::Ready => "READY",
            State::Streaming => "STREAMING",
            State::TxReady => "TX_READY",
            State::TxStreaming => "TX_STREAMING",
            State::Failed => "FAILED",
            State::Interrupted => "INTERRUPTED",
            State::Closed => "CLOSED",
        }
    }

    /// Whether a message outside the table is absorbed rather than fatal.
    pub fn is_absorbing(self) -> bool {
        matches!(self, State::Failed | State::Interrupted)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
