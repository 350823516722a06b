//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client. Their layout is
//! the same in every supported protocol version.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};
use crate::bolt::{BoltError, BoltResult};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - Operation completed successfully
    Success(SuccessMessage),
    /// RECORD - Result record
    Record(RecordMessage),
    /// FAILURE - Operation failed
    Failure(FailureMessage),
    /// IGNORED - Message was absorbed by a failed or interrupted connection
    Ignored,
}

impl BoltResponse {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BoltResponse::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BoltResponse::Failure(_))
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltResponse::Success(msg) => PackStreamStructure::new(
                tag::SUCCESS,
                vec![PackStreamValue::Map(msg.metadata.clone())],
            ),
            BoltResponse::Record(msg) => PackStreamStructure::new(
                tag::RECORD,
                vec![PackStreamValue::List(msg.fields.clone())],
            ),
            BoltResponse::Failure(msg) => {
                let mut metadata = HashMap::new();
                metadata.insert("code".to_string(), msg.code.clone().into());
                metadata.insert("message".to_string(), msg.message.clone().into());
                PackStreamStructure::new(tag::FAILURE, vec![PackStreamValue::Map(metadata)])
            }
            BoltResponse::Ignored => PackStreamStructure::new(tag::IGNORED, vec![]),
        }
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: PackStreamStructure) -> BoltResult<Self> {
        let tag = s.tag;
        let first = s.fields.into_iter().next();
        match tag {
            tag::SUCCESS => Ok(BoltResponse::Success(SuccessMessage::with_metadata(
                first.and_then(PackStreamValue::into_map).unwrap_or_default(),
            ))),
            tag::RECORD => match first {
                Some(PackStreamValue::List(fields)) => Ok(BoltResponse::Record(RecordMessage::new(fields))),
                _ => Err(BoltError::invalid_message("RECORD requires a field list")),
            },
            tag::FAILURE => {
                let metadata = first.and_then(PackStreamValue::into_map).unwrap_or_default();
                let text = |key: &str| metadata.get(key).and_then(|v| v.as_str()).unwrap_or_default();
                Ok(BoltResponse::Failure(FailureMessage::new(text("code"), text("message"))))
            }
            tag::IGNORED => Ok(BoltResponse::Ignored),
            other => Err(BoltError::invalid_message(format!(
                "Unknown response message tag: 0x{:02X}",
                other
            ))),
        }
    }
}

impl From<SuccessMessage> for BoltResponse {
    fn from(msg: SuccessMessage) -> Self {
        BoltResponse::Success(msg)
    }
}

impl From<FailureMessage> for BoltResponse {
    fn from(msg: FailureMessage) -> Self {
        BoltResponse::Failure(msg)
    }
}

/// SUCCESS message - Operation completed successfully.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: HashMap<String, PackStreamValue>,
}

impl SuccessMessage {
    /// Create a new SUCCESS message with empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(metadata: HashMap<String, PackStreamValue>) -> Self {
        Self { metadata }
    }

    /// Add metadata entry.
    pub fn add(&mut self, key: &str, value: impl Into<PackStreamValue>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    pub fn server(&self) -> Option<&str> {
        self.get("server").and_then(|v| v.as_str())
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.get("connection_id").and_then(|v| v.as_str())
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.get("bookmark").and_then(|v| v.as_str())
    }

    /// Field names from a RUN success.
    pub fn fields(&self) -> Option<Vec<String>> {
        self.get("fields")?.as_list().map(|list| {
            list.iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
    }

    /// Create a HELLO success response.
    pub fn hello_success(server: &str, connection_id: &str) -> Self {
        let mut msg = Self::new();
        msg.add("server", server);
        msg.add("connection_id", connection_id);
        msg
    }

    /// Create a RUN success response.
    pub fn run_success(fields: &[String], t_first: i64) -> Self {
        let mut msg = Self::new();
        let list: Vec<PackStreamValue> = fields.iter().cloned().map(PackStreamValue::String).collect();
        msg.add("fields", list);
        msg.add("t_first", t_first);
        msg
    }

    /// Create a PULL_ALL/DISCARD_ALL success response.
    pub fn streaming_success(t_last: i64, bookmark: Option<String>) -> Self {
        let mut msg = Self::new();
        msg.add("t_last", t_last);
        if let Some(bm) = bookmark {
            msg.add("bookmark", bm);
        }
        msg
    }

    /// Create a COMMIT success response.
    pub fn commit_success(bookmark: Option<String>) -> Self {
        let mut msg = Self::new();
        if let Some(bm) = bookmark {
            msg.add("bookmark", bm);
        }
        msg
    }
}

/// RECORD message - one result row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMessage {
    /// Field values
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }

    pub fn get(&self, index: usize) -> Option<&PackStreamValue> {
        self.fields.get(index)
    }
}

/// FAILURE message - Operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    /// Status code, e.g. `Neo.ClientError.Request.Invalid`
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl FailureMessage {
    /// Create a new FAILURE message.
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_tags() {
        assert_eq!(BoltResponse::Success(SuccessMessage::new()).tag(), tag::SUCCESS);
        assert_eq!(BoltResponse::Record(RecordMessage::new(vec![])).tag(), tag::RECORD);
        assert_eq!(BoltResponse::Failure(FailureMessage::new("c", "m")).tag(), tag::FAILURE);
        assert_eq!(BoltResponse::Ignored.tag(), tag::IGNORED);
    }

    #[test]
    fn test_hello_success() {
        let msg = SuccessMessage::hello_success("Zeta4G/0.1", "bolt-7");
        assert_eq!(msg.server(), Some("Zeta4G/0.1"));
        assert_eq!(msg.connection_id(), Some("bolt-7"));
    }

    #[test]
    fn test_run_success_fields() {
        let msg = SuccessMessage::run_success(&["1".to_string()], 0);
        assert_eq!(msg.fields(), Some(vec!["1".to_string()]));
        assert_eq!(msg.get("t_first").and_then(|v| v.as_int()), Some(0));
    }

    #[test]
    fn test_failure_structure() {
        let failure = BoltResponse::Failure(FailureMessage::new("Neo.ClientError.Request.Invalid", "no"));
        let s = failure.to_structure();
        assert_eq!(s.tag, tag::FAILURE);
        let map = s.fields[0].as_map().unwrap();
        assert_eq!(map.get("code").and_then(|v| v.as_str()), Some("Neo.ClientError.Request.Invalid"));

        assert_eq!(BoltResponse::from_structure(s).unwrap(), failure);
    }

    #[test]
    fn test_record_requires_list() {
        let s = PackStreamStructure::new(tag::RECORD, vec![PackStreamValue::Null]);
        assert!(BoltResponse::from_structure(s).is_err());
    }

    #[test]
    fn test_ignored_has_no_fields() {
        assert!(BoltResponse::Ignored.to_structure().fields.is_empty());
    }
}
