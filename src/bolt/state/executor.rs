//! Boundary to the query engine.
//!
//! The state machine never evaluates statements itself. It drives a
//! [`QueryExecutor`] created per connection and reports every
//! [`ExecutionError`] as a FAILURE carrying the engine's status code.

use std::collections::HashMap;

use crate::bolt::error::ExecutionError;
use crate::bolt::message::{BeginMessage, HelloMessage};
use crate::bolt::packstream::PackStreamValue;

/// Result type of the execution boundary.
pub type ExecResult<T> = Result<T, ExecutionError>;

/// Transaction a statement runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionContext {
    /// Implicit transaction committed when the result is consumed
    AutoCommit,
    /// Transaction opened by BEGIN
    Explicit,
}

/// What the engine reports once a result has been consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Bookmark of the auto-commit transaction, if any
    pub bookmark: Option<String>,
}

/// Records produced by one RUN.
pub trait ResultStream: Send {
    /// Field names, reported in the RUN success.
    fn fields(&self) -> &[String];

    /// Next record, or `None` once exhausted.
    fn next_record(&mut self) -> ExecResult<Option<Vec<PackStreamValue>>>;

    /// Finish the result after the last record (or after a discard).
    fn finish(&mut self) -> ExecResult<StreamSummary>;
}

/// Per-connection view of the query engine.
pub trait QueryExecutor: Send {
    /// Called once for HELLO. Authentication lives behind this call.
    fn open_session(&mut self, _hello: &HelloMessage) -> ExecResult<()> {
        Ok(())
    }

    fn run(
        &mut self,
        statement: &str,
        parameters: &HashMap<String, PackStreamValue>,
        context: TransactionContext,
    ) -> ExecResult<Box<dyn ResultStream>>;

    fn begin(&mut self, begin: &BeginMessage) -> ExecResult<()>;

    /// Commit the explicit transaction, returning its bookmark.
    fn commit(&mut self) -> ExecResult<Option<String>>;

    fn rollback(&mut self) -> ExecResult<()>;

    /// Discard open work and roll back any open transaction.
    fn reset(&mut self) -> ExecResult<()>;
}

/// Creates one executor per connection.
pub trait ExecutorFactory: Send + Sync {
    fn create(&self, connection_id: &str) -> Box<dyn QueryExecutor>;
}

impl<F> ExecutorFactory for F
where
    F: Fn(&str) -> Box<dyn QueryExecutor> + Send + Sync,
{
    fn create(&self, connection_id: &str) -> Box<dyn QueryExecutor> {
        self(connection_id)
    }
}

/// In-memory result with fixed rows.
#[derive(Debug, Clone, Default)]
pub struct RecordBuffer {
    fields: Vec<String>,
    records: std::collections::VecDeque<Vec<PackStreamValue>>,
    bookmark: Option<String>,
}

impl RecordBuffer {
    pub fn new(fields: Vec<String>, records: Vec<Vec<PackStreamValue>>) -> Self {
        Self {
            fields,
            records: records.into(),
            bookmark: None,
        }
    }

    /// Report `bookmark` from [`ResultStream::finish`].
    pub fn with_bookmark(mut self, bookmark: impl Into<String>) -> Self {
        self.bookmark = Some(bookmark.into());
        self
    }
}

impl ResultStream for RecordBuffer {
    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn next_record(&mut self) -> ExecResult<Option<Vec<PackStreamValue>>> {
        Ok(self.records.pop_front())
    }

    fn finish(&mut self) -> ExecResult<StreamSummary> {
        self.records.clear();
        Ok(StreamSummary {
            bookmark: self.bookmark.take(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor for state machine and worker tests.
    //!
    //! `RETURN <n>` yields one record `[n]` with field `"<n>"`. `FAIL` fails
    //! at run time, `BROKEN` fails while streaming the second record,
    //! `UNWIND <n>` yields records `0..n` in field `"x"`.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::bolt::error::BoltErrorCode;

    #[derive(Debug, Default)]
    pub struct Journal {
        pub calls: Vec<String>,
        pub commits: usize,
    }

    pub struct ScriptedExecutor {
        pub journal: Arc<Mutex<Journal>>,
        in_tx: bool,
    }

    impl ScriptedExecutor {
        pub fn new() -> (Self, Arc<Mutex<Journal>>) {
            let journal = Arc::new(Mutex::new(Journal::default()));
            (
                Self {
                    journal: Arc::clone(&journal),
                    in_tx: false,
                },
                journal,
            )
        }

        fn log(&self, call: impl Into<String>) {
            self.journal.lock().calls.push(call.into());
        }
    }

    struct Broken {
        fields: Vec<String>,
        sent: usize,
    }

    impl ResultStream for Broken {
        fn fields(&self) -> &[String] {
            &self.fields
        }

        fn next_record(&mut self) -> ExecResult<Option<Vec<PackStreamValue>>> {
            self.sent += 1;
            if self.sent > 1 {
                return Err(ExecutionError::new(BoltErrorCode::EXECUTION_FAILED, "stream broke"));
            }
            Ok(Some(vec![PackStreamValue::Integer(0)]))
        }

        fn finish(&mut self) -> ExecResult<StreamSummary> {
            Ok(StreamSummary::default())
        }
    }

    impl QueryExecutor for ScriptedExecutor {
        fn open_session(&mut self, hello: &HelloMessage) -> ExecResult<()> {
            self.log(format!("hello {}", hello.user_agent));
            Ok(())
        }

        fn run(
            &mut self,
            statement: &str,
            _parameters: &HashMap<String, PackStreamValue>,
            context: TransactionContext,
        ) -> ExecResult<Box<dyn ResultStream>> {
            self.log(format!("run {}", statement));
            let explicit = context == TransactionContext::Explicit;
            let bookmark = |buffer: RecordBuffer| {
                if explicit {
                    buffer
                } else {
                    buffer.with_bookmark("bm:auto")
                }
            };

            if let Some(n) = statement.strip_prefix("RETURN ") {
                let value: i64 = n
                    .trim()
                    .parse()
                    .map_err(|_| ExecutionError::new(BoltErrorCode::SYNTAX_ERROR, "bad literal"))?;
                return Ok(Box::new(bookmark(RecordBuffer::new(
                    vec![n.trim().to_string()],
                    vec![vec![PackStreamValue::Integer(value)]],
                ))));
            }
            if let Some(n) = statement.strip_prefix("UNWIND ") {
                let count: i64 = n.trim().parse().unwrap_or(0);
                let rows = (0..count).map(|i| vec![PackStreamValue::Integer(i)]).collect();
                return Ok(Box::new(bookmark(RecordBuffer::new(vec!["x".to_string()], rows))));
            }
            match statement {
                "BROKEN" => Ok(Box::new(Broken {
                    fields: vec!["x".to_string()],
                    sent: 0,
                })),
                _ => Err(ExecutionError::new(BoltErrorCode::SYNTAX_ERROR, "Invalid input")),
            }
        }

        fn begin(&mut self, _begin: &BeginMessage) -> ExecResult<()> {
            self.log("begin");
            self.in_tx = true;
            Ok(())
        }

        fn commit(&mut self) -> ExecResult<Option<String>> {
            self.log("commit");
            self.in_tx = false;
            let mut journal = self.journal.lock();
            journal.commits += 1;
            Ok(Some(format!("bm:tx:{}", journal.commits)))
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
}
