//! Connection state machine.
//!
//! Transitions are decided by [`plan`], a pure function of the current
//! state, the message kind and the version's [`MessageRules`]. The
//! [`ConnectionStateMachine`] then carries the planned action out against
//! the executor and emits responses.

use std::time::Instant;

use tracing::{debug, warn};

use super::executor::{QueryExecutor, ResultStream, TransactionContext};
use super::interrupt::InterruptSignal;
use super::rules::MessageRules;
use super::State;
use crate::bolt::error::{BoltError, BoltErrorCode, BoltResult, ExecutionError};
use crate::bolt::handshake::ProtocolVersion;
use crate::bolt::message::{
    BoltRequest, BoltResponse, FailureMessage, MessageKind, RecordMessage, SuccessMessage,
};

/// What the machine does with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open the session and report server identity
    Hello,
    Run,
    Begin,
    Commit,
    Rollback,
    /// Stream remaining records
    Pull,
    /// Drop remaining records
    Discard,
    /// RESET with nothing to clear: plain SUCCESS
    Acknowledge,
    /// RESET clearing a failure or one interrupt
    Reset,
    /// Raise the interrupt depth
    Interrupt,
    /// Absorb with IGNORED
    Ignore,
    /// GOODBYE: close without a response
    Disconnect,
    /// Protocol violation: one FAILURE, then the connection is killed
    Violation,
}

/// A planned transition.
///
/// `next` is the state reached when the action succeeds. Executing actions
/// that fail move to [`State::Failed`] instead. A `Reset` only reaches
/// `next` once the interrupt depth is back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: State,
}

impl Transition {
    fn to(action: Action, next: State) -> Self {
        Self { action, next }
    }
}

/// Decide what `kind` does in `state`.
pub fn plan(state: State, kind: MessageKind, rules: &MessageRules) -> Transition {
    use Action::*;
    use MessageKind as K;

    if state == State::Closed {
        return Transition::to(Violation, State::Closed);
    }
    if !rules.defines(kind) {
        return match state {
            State::Interrupted => Transition::to(Ignore, state),
            _ => Transition::to(Violation, State::Closed),
        };
    }
    if kind == K::Goodbye {
        return Transition::to(Disconnect, State::Closed);
    }

    match (state, kind) {
        (State::Interrupted, K::Interrupt) => Transition::to(Interrupt, State::Interrupted),
        (State::Interrupted, K::Reset) => Transition::to(Reset, State::Ready),
        (State::Interrupted, _) => Transition::to(Ignore, State::Interrupted),

        (State::Failed, K::Interrupt) => Transition::to(Interrupt, State::Failed),
        (State::Failed, K::Reset) => Transition::to(Reset, State::Ready),
        (State::Failed, k) if rules.ignored_when_failed(k) => Transition::to(Ignore, State::Failed),

        (State::Connected, K::Hello) => Transition::to(Hello, State::Ready),

        (State::Ready, K::Run) => Transition::to(Run, State::Streaming),
        (State::Ready, K::Begin) => Transition::to(Begin, State::TxReady),
        (State::Ready, K::Reset) => Transition::to(Acknowledge, State::Ready),

        (State::Streaming, K::PullAll) => Transition::to(Pull, State::Ready),
        (State::Streaming, K::DiscardAll) => Transition::to(Discard, State::Ready),

        (State::TxReady, K::Run) => Transition::to(Run, State::TxStreaming),
        (State::TxReady, K::Commit) => Transition::to(Commit, State::Ready),
        (State::TxReady, K::Rollback) => Transition::to(Rollback, State::Ready),

        (State::TxStreaming, K::PullAll) => Transition::to(Pull, State::TxReady),
        (State::TxStreaming, K::DiscardAll) => Transition::to(Discard, State::TxReady),

        (
            State::Ready | State::Streaming | State::TxReady | State::TxStreaming,
            K::Interrupt,
        ) => Transition::to(Interrupt, State::Interrupted),

        _ => Transition::to(Violation, State::Closed),
    }
}

/// Receives responses as the machine produces them.
///
/// An error means the response path is gone; the machine stops and treats
/// the connection as dead.
pub trait ResponseHandler {
    fn on_response(&mut self, response: BoltResponse) -> BoltResult<()>;
}

impl ResponseHandler for Vec<BoltResponse> {
    fn on_response(&mut self, response: BoltResponse) -> BoltResult<()> {
        self.push(response);
        Ok(())
    }
}

/// How a dispatch ended for the connection.
#[derive(Debug)]
pub enum Outcome {
    /// Keep reading messages
    Continue,
    /// GOODBYE: close without writing anything more
    Disconnect,
    /// The connection must be torn down
    Fatal(BoltError),
}

/// Per-connection protocol state machine.
pub struct ConnectionStateMachine {
    connection_id: String,
    server_agent: String,
    version: ProtocolVersion,
    rules: MessageRules,
    state: State,
    interrupt_depth: usize,
    signal: InterruptSignal,
    executor: Box<dyn QueryExecutor>,
    /// Open result between RUN and PULL_ALL/DISCARD_ALL
    stream: Option<Box<dyn ResultStream>>,
    /// Executor already reset by `close`
    released: bool,
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("connection_id", &self.connection_id)
            .field("version", &self.version)
            .field("state", &self.state)
            .field("interrupt_depth", &self.interrupt_depth)
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

impl ConnectionStateMachine {
    pub fn new(
        connection_id: impl Into<String>,
        server_agent: impl Into<String>,
        version: ProtocolVersion,
        rules: MessageRules,
        executor: Box<dyn QueryExecutor>,
        signal: InterruptSignal,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            server_agent: server_agent.into(),
            version,
            rules,
            state: State::Connected,
            interrupt_depth: 0,
            signal,
            executor,
            stream: None,
            released: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn interrupt_depth(&self) -> usize {
        self.interrupt_depth
    }

    /// Handle shared with the inbound reader.
    pub fn signal(&self) -> &InterruptSignal {
        &self.signal
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Apply pending interrupts, then dispatch `request`.
    pub fn process(&mut self, request: BoltRequest, out: &mut dyn ResponseHandler) -> Outcome {
        if self.is_closed() {
            return Outcome::Fatal(BoltError::ConnectionClosed);
        }

        for _ in 0..self.signal.take() {
            match self.dispatch(MessageKind::Interrupt, None, out) {
                Outcome::Continue => {}
                other => return other,
            }
        }

        debug!(message = request.name(), state = ?self.state, "dispatch");
        let kind = request.kind();
        self.dispatch(kind, Some(request), out)
    }

    /// Apply one interrupt immediately.
    pub fn interrupt(&mut self, out: &mut dyn ResponseHandler) -> Outcome {
        if self.is_closed() {
            return Outcome::Fatal(BoltError::ConnectionClosed);
        }
        self.dispatch(MessageKind::Interrupt, None, out)
    }

    /// Terminal teardown: drop open work and roll back any transaction.
    ///
    /// Safe to call more than once; only the first call reaches the executor.
    pub fn close(&mut self) {
        self.state = State::Closed;
        self.stream = None;
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.executor.reset() {
            warn!(error = %e, "executor reset failed during close");
        }
    }

    fn dispatch(
        &mut self,
        kind: MessageKind,
        request: Option<BoltRequest>,
        out: &mut dyn ResponseHandler,
    ) -> Outcome {
        let transition = plan(self.state, kind, &self.rules);
        match self.execute(transition, kind, request, out) {
            Ok(outcome) => outcome,
            Err(e) => {
                // The response path is gone
                self.state = State::Closed;
                Outcome::Fatal(e)
            }
        }
    }

    fn execute(
        &mut self,
        transition: Transition,
        kind: MessageKind,
        request: Option<BoltRequest>,
        out: &mut dyn ResponseHandler,
    ) -> BoltResult<Outcome> {
        let Transition { action, next } = transition;
        match (action, request) {
            (Action::Violation, _) => {
                let err = BoltError::protocol(format!(
                    "Message {} cannot be handled by a session in the {} state",
                    kind.name(),
                    self.state.name()
                ));
                warn!(connection_id = %self.connection_id, error = %err, "protocol violation");
                out.on_response(err.to_failure().into())?;
                self.close();
                return Ok(Outcome::Fatal(err));
            }
            (Action::Disconnect, _) => {
                debug!(connection_id = %self.connection_id, "GOODBYE");
                self.close();
                return Ok(Outcome::Disconnect);
            }
            (Action::Ignore, _) => out.on_response(BoltResponse::Ignored)?,
            (Action::Interrupt, _) => {
                self.interrupt_depth += 1;
                self.state = next;
            }
            (Action::Acknowledge, _) => out.on_response(SuccessMessage::new().into())?,
            (Action::Reset, _) => self.reset(next, out)?,
            (Action::Hello, Some(BoltRequest::Hello(hello))) => {
                let result = self.executor.open_session(&hello);
                self.complete(result, next, out, |machine, ()| {
                    SuccessMessage::hello_success(&machine.server_agent, &machine.connection_id)
                })?;
            }
            (Action::Run, Some(BoltRequest::Run(run))) => {
                let context = match self.state {
                    State::TxReady => TransactionContext::Explicit,
                    _ => TransactionContext::AutoCommit,
                };
                let started = Instant::now();
                let result = self.executor.run(&run.statement, &run.parameters, context);
                self.complete(result, next, out, |machine, stream| {
                    let success = SuccessMessage::run_success(stream.fields(), elapsed_ms(started));
                    machine.stream = Some(stream);
                    success
                })?;
            }
            (Action::Begin, Some(BoltRequest::Begin(begin))) => {
                let result = self.executor.begin(&begin);
                self.complete(result, next, out, |_, ()| SuccessMessage::new())?;
            }
            (Action::Commit, _) => {
                let result = self.executor.commit();
                self.complete(result, next, out, |_, bookmark| SuccessMessage::commit_success(bookmark))?;
            }
            (Action::Rollback, _) => {
                let result = self.executor.rollback();
                self.complete(result, next, out, |_, ()| SuccessMessage::new())?;
            }
            (Action::Pull, _) => self.consume(next, true, out)?,
            (Action::Discard, _) => self.consume(next, false, out)?,
            (action, request) => {
                // The plan and the request kind always agree
                return Err(BoltError::Internal(format!(
                    "action {:?} planned for {:?}",
                    action,
                    request.map(|r| r.name())
                )));
            }
        }
        Ok(Outcome::Continue)
    }

    /// Report an executor result: SUCCESS and `next`, or FAILURE and `Failed`.
    fn complete<T>(
        &mut self,
        result: Result<T, ExecutionError>,
        next: State,
        out: &mut dyn ResponseHandler,
        success: impl FnOnce(&mut Self, T) -> SuccessMessage,
    ) -> BoltResult<()> {
        match result {
            Ok(value) => {
                let message = success(self, value);
                self.state = next;
                out.on_response(message.into())
            }
            Err(e) => self.fail(e, out),
        }
    }

    fn fail(&mut self, error: ExecutionError, out: &mut dyn ResponseHandler) -> BoltResult<()> {
        debug!(code = %error.code, "execution failed");
        self.stream = None;
        self.state = State::Failed;
        out.on_response(FailureMessage::new(&error.code, &error.message).into())
    }

    fn reset(&mut self, next: State, out: &mut dyn ResponseHandler) -> BoltResult<()> {
        self.interrupt_depth = self.interrupt_depth.saturating_sub(1);
        if self.interrupt_depth > 0 {
            self.state = State::Interrupted;
            return out.on_response(BoltResponse::Ignored);
        }
        self.stream = None;
        let result = self.executor.reset();
        self.complete(result, next, out, |_, ()| SuccessMessage::new())
    }

    /// PULL_ALL (`emit`) or DISCARD_ALL: drain the open result.
    fn consume(&mut self, next: State, emit: bool, out: &mut dyn ResponseHandler) -> BoltResult<()> {
        let Some(mut stream) = self.stream.take() else {
            let error = ExecutionError::new(BoltErrorCode::GENERAL_ERROR, "No open result to consume");
            return self.fail(error, out);
        };
        let started = Instant::now();

        loop {
            if self.signal.is_raised() {
                debug!("result stream interrupted");
                return self.fail(ExecutionError::terminated(), out);
            }
            match stream.next_record() {
                Ok(Some(fields)) if emit => out.on_response(BoltResponse::Record(RecordMessage::new(fields)))?,
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => return self.fail(e, out),
            }
        }

        let summary = stream.finish();
        // Bookmarks belong to auto-commit results only
        let auto_commit = next == State::Ready;
        self.complete(summary, next, out, |_, summary| {
            let bookmark = if auto_commit { summary.bookmark } else { None };
            SuccessMessage::streaming_success(elapsed_ms(started), bookmark)
        })
    }
}

impl Drop for ConnectionStateMachine {
    fn drop(&mut self) {
        self.close();
    }
}

fn elapsed_ms(since: Instant) -> i64 {
    i64::try_from(since.elapsed().as_millis()).unwrap_or(i64::MAX)
}
