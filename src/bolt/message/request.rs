//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server. The layout of
//! some of them changed between protocol versions, so conversion to and from
//! structures takes the negotiated [`ProtocolVersion`].

use std::collections::HashMap;
use std::fmt;

use super::{tag, MessageKind};
use crate::bolt::handshake::ProtocolVersion;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};
use crate::bolt::{BoltError, BoltResult};

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    /// Parse the `mode` metadata entry; anything but "r" means write.
    pub fn parse(s: &str) -> Self {
        match s {
            "r" | "R" => AccessMode::Read,
            _ => AccessMode::Write,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Authentication token carried by HELLO (or INIT before version 3).
///
/// The engine does not authenticate; the token is handed to the executor
/// as-is. `Debug` never prints the credentials.
#[derive(Clone, Default, PartialEq)]
pub struct AuthToken {
    /// Authentication scheme (e.g., "basic", "none")
    pub scheme: String,
    pub principal: Option<String>,
    pub credentials: Option<String>,
}

impl AuthToken {
    /// Create a basic auth token.
    pub fn basic(principal: &str, credentials: &str) -> Self {
        Self {
            scheme: "basic".to_string(),
            principal: Some(principal.to_string()),
            credentials: Some(credentials.to_string()),
        }
    }

    /// Create an anonymous auth token (no auth).
    pub fn none() -> Self {
        Self {
            scheme: "none".to_string(),
            principal: None,
            credentials: None,
        }
    }

    fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        let text = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Self {
            scheme: text("scheme").unwrap_or_else(|| "none".to_string()),
            principal: text("principal"),
            credentials: text("credentials"),
        }
    }

    fn write_into(&self, map: &mut HashMap<String, PackStreamValue>) {
        map.insert("scheme".to_string(), self.scheme.clone().into());
        if let Some(ref p) = self.principal {
            map.insert("principal".to_string(), p.clone().into());
        }
        if let Some(ref c) = self.credentials {
            map.insert("credentials".to_string(), c.clone().into());
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "******"))
            .finish()
    }
}

/// All Bolt request messages understood by the engine.
///
/// Interrupts are not wire messages; they are raised out of band through
/// [`InterruptSignal`](crate::bolt::state::InterruptSignal).
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// HELLO (INIT before version 3) - Initialize connection
    Hello(HelloMessage),
    /// RUN - Execute a statement
    Run(RunMessage),
    /// BEGIN - Start transaction
    Begin(BeginMessage),
    /// COMMIT - Commit transaction
    Commit,
    /// ROLLBACK - Rollback transaction
    Rollback,
    /// PULL_ALL (PULL from version 4) - Stream all remaining records
    PullAll,
    /// DISCARD_ALL (DISCARD from version 4) - Drop all remaining records
    DiscardAll,
    /// RESET - Clear failures and interrupts
    Reset,
    /// GOODBYE - Close connection
    Goodbye,
}

impl BoltRequest {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello(_) => tag::HELLO,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::PullAll => tag::PULL,
            BoltRequest::DiscardAll => tag::DISCARD,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Goodbye => tag::GOODBYE,
        }
    }

    /// Kind used by the transition table.
    pub fn kind(&self) -> MessageKind {
        match self {
            BoltRequest::Hello(_) => MessageKind::Hello,
            BoltRequest::Run(_) => MessageKind::Run,
            BoltRequest::Begin(_) => MessageKind::Begin,
            BoltRequest::Commit => MessageKind::Commit,
            BoltRequest::Rollback => MessageKind::Rollback,
            BoltRequest::PullAll => MessageKind::PullAll,
            BoltRequest::DiscardAll => MessageKind::DiscardAll,
            BoltRequest::Reset => MessageKind::Reset,
            BoltRequest::Goodbye => MessageKind::Goodbye,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Convert to PackStream structure using the layout of `version`.
    pub fn to_structure(&self, version: ProtocolVersion) -> PackStreamStructure {
        let fields = match self {
            BoltRequest::Hello(msg) => msg.to_fields(version),
            BoltRequest::Run(msg) => msg.to_fields(version),
            BoltRequest::Begin(msg) => vec![PackStreamValue::Map(msg.to_map())],
            BoltRequest::PullAll | BoltRequest::DiscardAll if version >= ProtocolVersion::V4_0 => {
                let mut extra = HashMap::new();
                extra.insert("n".to_string(), PackStreamValue::Integer(-1));
                vec![PackStreamValue::Map(extra)]
            }
            _ => Vec::new(),
        };
        PackStreamStructure::new(self.tag(), fields)
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: PackStreamStructure, version: ProtocolVersion) -> BoltResult<Self> {
        let explicit_tx = version.has_explicit_transactions();
        match s.tag {
            tag::HELLO => Ok(BoltRequest::Hello(HelloMessage::from_structure(s, version)?)),
            tag::RUN => Ok(BoltRequest::Run(RunMessage::from_structure(s, version)?)),
            tag::PULL => {
                check_pull_extra(&s, version)?;
                Ok(BoltRequest::PullAll)
            }
            tag::DISCARD => {
                check_pull_extra(&s, version)?;
                Ok(BoltRequest::DiscardAll)
            }
            tag::RESET => Ok(BoltRequest::Reset),
            tag::BEGIN if explicit_tx => Ok(BoltRequest::Begin(BeginMessage::from_structure(s)?)),
            tag::COMMIT if explicit_tx => Ok(BoltRequest::Commit),
            tag::ROLLBACK if explicit_tx => Ok(BoltRequest::Rollback),
            tag::GOODBYE if explicit_tx => Ok(BoltRequest::Goodbye),
            other => Err(BoltError::invalid_message(format!(
                "Unknown request message tag 0x{:02X} for protocol {}",
                other, version
            ))),
        }
    }
}

/// PULL and DISCARD carry `{n, qid}` from version 4. Partial pulls are not
/// supported, so only `n == -1` (everything) is accepted.
fn check_pull_extra(s: &PackStreamStructure, version: ProtocolVersion) -> BoltResult<()> {
    if version < ProtocolVersion::V4_0 {
        return Ok(());
    }
    let extra = s
        .field(0)
        .and_then(|v| v.as_map())
        .ok_or_else(|| BoltError::invalid_message("PULL/DISCARD requires an extra map"))?;
    match extra.get("n").map(|v| v.as_int()) {
        None | Some(Some(-1)) => Ok(()),
        Some(_) => Err(BoltError::invalid_message("Only n = -1 is supported")),
    }
}

/// HELLO message - Initialize connection.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// User agent string
    pub user_agent: String,
    /// Authentication token
    pub auth: AuthToken,
    /// Remaining metadata entries
    pub extra: HashMap<String, PackStreamValue>,
}

impl HelloMessage {
    /// Create a new HELLO message.
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            auth: AuthToken::none(),
            extra: HashMap::new(),
        }
    }

    /// Set authentication.
    pub fn with_auth(mut self, auth: AuthToken) -> Self {
        self.auth = auth;
        self
    }

    fn to_fields(&self, version: ProtocolVersion) -> Vec<PackStreamValue> {
        if version.has_explicit_transactions() {
            let mut extra = self.extra.clone();
            extra.insert("user_agent".to_string(), self.user_agent.clone().into());
            self.auth.write_into(&mut extra);
            vec![PackStreamValue::Map(extra)]
        } else {
            let mut auth = HashMap::new();
            self.auth.write_into(&mut auth);
            vec![self.user_agent.clone().into(), PackStreamValue::Map(auth)]
        }
    }

    fn from_structure(s: PackStreamStructure, version: ProtocolVersion) -> BoltResult<Self> {
        let mut fields = s.fields.into_iter();

        if !version.has_explicit_transactions() {
            // INIT: (user_agent, auth)
            let user_agent = match fields.next() {
                Some(PackStreamValue::String(s)) => s,
                _ => return Err(BoltError::invalid_message("INIT requires a user agent string")),
            };
            let auth = fields
                .next()
                .and_then(PackStreamValue::into_map)
                .ok_or_else(|| BoltError::invalid_message("INIT requires an auth map"))?;
            return Ok(Self {
                user_agent,
                auth: AuthToken::from_map(&auth),
                extra: HashMap::new(),
            });
        }

        let mut extra = fields
            .next()
            .and_then(PackStreamValue::into_map)
            .ok_or_else(|| BoltError::invalid_message("HELLO requires a metadata map"))?;

        let auth = AuthToken::from_map(&extra);
        let user_agent = match extra.remove("user_agent") {
            Some(PackStreamValue::String(s)) => s,
            _ => return Err(BoltError::invalid_message("HELLO requires user_agent")),
        };
        for key in ["scheme", "principal", "credentials"] {
            extra.remove(key);
        }

        Ok(Self {
            user_agent,
            auth,
            extra,
        })
    }
}

/// RUN message - Execute a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    /// Statement text
    pub statement: String,
    /// Statement parameters
    pub parameters: HashMap<String, PackStreamValue>,
    /// Extra metadata (version 3+)
    pub extra: HashMap<String, PackStreamValue>,
}

impl RunMessage {
    /// Create a new RUN message.
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            parameters: HashMap::new(),
            extra: HashMap::new(),
        }
    }

    /// Set statement parameters.
    pub fn with_parameters(mut self, params: HashMap<String, PackStreamValue>) -> Self {
        self.parameters = params;
        self
    }

    fn to_fields(&self, version: ProtocolVersion) -> Vec<PackStreamValue> {
        let mut fields = vec![
            self.statement.clone().into(),
            PackStreamValue::Map(self.parameters.clone()),
        ];
        if version.has_explicit_transactions() {
            fields.push(PackStreamValue::Map(self.extra.clone()));
        }
        fields
    }

    fn from_structure(s: PackStreamStructure, version: ProtocolVersion) -> BoltResult<Self> {
        let mut fields = s.fields.into_iter();

        let statement = match fields.next() {
            Some(PackStreamValue::String(s)) => s,
            _ => return Err(BoltError::invalid_message("RUN statement must be a string")),
        };
        let parameters = fields
            .next()
            .and_then(PackStreamValue::into_map)
            .ok_or_else(|| BoltError::invalid_message("RUN parameters must be a map"))?;
        let extra = if version.has_explicit_transactions() {
            fields
                .next()
                .and_then(PackStreamValue::into_map)
                .ok_or_else(|| BoltError::invalid_message("RUN metadata must be a map"))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            statement,
            parameters,
            extra,
        })
    }
}

/// BEGIN message - Start an explicit transaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeginMessage {
    /// Bookmarks the transaction must observe
    pub bookmarks: Vec<String>,
    /// Access mode
    pub mode: AccessMode,
    /// Remaining metadata entries (tx_timeout, tx_metadata, db, ...)
    pub extra: HashMap<String, PackStreamValue>,
}

impl BeginMessage {
    /// Create a new BEGIN message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = self.extra.clone();
        if !self.bookmarks.is_empty() {
            let list = self.bookmarks.iter().cloned().map(PackStreamValue::String).collect();
            map.insert("bookmarks".to_string(), PackStreamValue::List(list));
        }
        if self.mode == AccessMode::Read {
            map.insert("mode".to_string(), "r".into());
        }
        map
    }

    fn from_structure(s: PackStreamStructure) -> BoltResult<Self> {
        let mut extra = s
            .fields
            .into_iter()
            .next()
            .and_then(PackStreamValue::into_map)
            .ok_or_else(|| BoltError::invalid_message("BEGIN requires a metadata map"))?;

        let bookmarks = match extra.remove("bookmarks") {
            None | Some(PackStreamValue::Null) => Vec::new(),
            Some(PackStreamValue::List(list)) => list
                .into_iter()
                .map(|v| match v {
                    PackStreamValue::String(s) => Ok(s),
                    other => Err(BoltError::invalid_message(format!(
                        "Bookmark must be a string, got {}",
                        other.type_name()
                    ))),
                })
                .collect::<BoltResult<_>>()?,
            Some(other) => {
                return Err(BoltError::invalid_message(format!(
                    "bookmarks must be a list, got {}",
                    other.type_name()
                )))
            }
        };
        let mode = extra
            .remove("mode")
            .and_then(|v| v.as_str().map(AccessMode::parse))
            .unwrap_or_default();

        Ok(Self {
            bookmarks,
            mode,
            extra,
        })
    }
}
