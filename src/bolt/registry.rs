//! Registered protocol versions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::handshake::ProtocolVersion;
use super::message::{MessageCodec, PackStreamCodec};
use super::state::{ConnectionStateMachine, ExecutorFactory, InterruptSignal, MessageRules};

/// Everything needed to speak one negotiated version.
#[derive(Clone)]
pub struct BoltProtocol {
    version: ProtocolVersion,
    codec: Arc<dyn MessageCodec>,
    rules: MessageRules,
}

impl BoltProtocol {
    pub fn new(version: ProtocolVersion, codec: Arc<dyn MessageCodec>, rules: MessageRules) -> Self {
        Self {
            version,
            codec,
            rules,
        }
    }

    /// PackStream codec and the standard rules for `version`.
    pub fn packstream(version: ProtocolVersion) -> Self {
        Self::new(
            version,
            Arc::new(PackStreamCodec::new(version)),
            MessageRules::for_version(version),
        )
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn codec(&self) -> Arc<dyn MessageCodec> {
        Arc::clone(&self.codec)
    }

    pub fn rules(&self) -> &MessageRules {
        &self.rules
    }
}

impl fmt::Debug for BoltProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoltProtocol")
            .field("version", &self.version)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

/// Maps negotiated versions to their codec and state machine factory.
#[derive(Clone)]
pub struct ProtocolRegistry {
    protocols: BTreeMap<ProtocolVersion, BoltProtocol>,
    executors: Arc<dyn ExecutorFactory>,
}

impl ProtocolRegistry {
    /// Empty registry; every handshake is rejected until versions are added.
    pub fn new(executors: Arc<dyn ExecutorFactory>) -> Self {
        Self {
            protocols: BTreeMap::new(),
            executors,
        }
    }

    /// Registry with PackStream versions 1, 2, 3 and 4.0.
    pub fn with_defaults(executors: Arc<dyn ExecutorFactory>) -> Self {
        let mut registry = Self::new(executors);
        for version in [
            ProtocolVersion::V1,
            ProtocolVersion::V2,
            ProtocolVersion::V3,
            ProtocolVersion::V4_0,
        ] {
            registry.register(BoltProtocol::packstream(version));
        }
        registry
    }

    /// Add or replace a version.
    pub fn register(&mut self, protocol: BoltProtocol) -> &mut Self {
        self.protocols.insert(protocol.version, protocol);
        self
    }

    /// Only keep the given versions.
    pub fn retain(&mut self, versions: &[ProtocolVersion]) -> &mut Self {
        self.protocols.retain(|v, _| versions.contains(v));
        self
    }

    pub fn get(&self, version: ProtocolVersion) -> Option<&BoltProtocol> {
        self.protocols.get(&version)
    }

    pub fn contains(&self, version: ProtocolVersion) -> bool {
        self.protocols.contains_key(&version)
    }

    /// Registered versions, lowest first.
    pub fn versions(&self) -> Vec<ProtocolVersion> {
        self.protocols.keys().copied().collect()
    }

    /// Codec and a fresh state machine for one connection.
    pub fn instantiate(
        &self,
        version: ProtocolVersion,
        connection_id: &str,
        server_agent: &str,
        signal: InterruptSignal,
    ) -> Option<(Arc<dyn MessageCodec>, ConnectionStateMachine)> {
        let protocol = self.get(version)?;
        let machine = ConnectionStateMachine::new(
            connection_id,
            server_agent,
            version,
            protocol.rules.clone(),
            self.executors.create(connection_id),
            signal,
        );
        Some((protocol.codec(), machine))
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("versions", &self.versions())
            .finish_non_exhaustive()
    }
}
