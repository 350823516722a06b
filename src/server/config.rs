//! Server configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::bolt::codec::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_SIZE, MAX_CHUNK_SIZE};
use crate::bolt::throttle::duration_ms;
use crate::bolt::{BoltError, BoltResult, ThrottleConfig, TlsConfig};

/// Default listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:7687";

/// Default `server` value reported in the HELLO success.
pub const DEFAULT_SERVER_AGENT: &str = concat!("Zeta4G/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// EncryptionLevel
// ============================================================================

/// Whether clients must, may or cannot use TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionLevel {
    /// TLS records are rejected
    #[default]
    Disabled,
    /// TLS and plaintext both accepted
    Optional,
    /// Plaintext handshakes are refused
    Required,
}

impl EncryptionLevel {
    pub fn accepts_tls(self) -> bool {
        self != EncryptionLevel::Disabled
    }

    pub fn requires_tls(self) -> bool {
        self == EncryptionLevel::Required
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// Bolt server settings.
///
/// # Fields
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `listen_address` | `127.0.0.1:7687` | TCP address to bind |
/// | `encryption` | `disabled` | TLS policy |
/// | `tls` | none | certificate and key, needed unless encryption is disabled |
/// | `max_message_size` | 16 MiB | largest reassembled request |
/// | `max_chunk_size` | 16384 | largest outbound chunk body |
/// | `output_buffer_size` | 8192 | bytes framed per write |
/// | `inbound_queue_capacity` | 64 | decoded requests buffered ahead of the worker |
/// | `handshake_timeout` | 10s | classification plus version handshake |
/// | `close_flush_timeout` | 5s | time given to pending output on close |
/// | `server_agent` | `Zeta4G/<version>` | HELLO `server` metadata |
/// | `throttle` | none | write throttle; `None` disables it |
///
/// Durations deserialize from integer milliseconds.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use zeta4g_bolt_server::{ServerConfig, ThrottleConfig};
///
/// let config = ServerConfig::builder()
///     .listen_address("0.0.0.0:7687")
///     .handshake_timeout(Duration::from_secs(5))
///     .throttle(ThrottleConfig::new(32 * 1024, 64 * 1024, Duration::from_secs(60)))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub encryption: EncryptionLevel,
    pub tls: Option<TlsConfig>,
    pub max_message_size: usize,
    pub max_chunk_size: usize,
    pub output_buffer_size: usize,
    pub inbound_queue_capacity: usize,
    #[serde(with = "duration_ms")]
    pub handshake_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub close_flush_timeout: Duration,
    pub server_agent: String,
    pub throttle: Option<ThrottleConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            encryption: EncryptionLevel::Disabled,
            tls: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_chunk_size: DEFAULT_CHUNK_SIZE,
            output_buffer_size: 8192,
            inbound_queue_capacity: 64,
            handshake_timeout: Duration::from_secs(10),
            close_flush_timeout: Duration::from_secs(5),
            server_agent: DEFAULT_SERVER_AGENT.to_string(),
            throttle: None,
        }
    }
}

impl ServerConfig {
    /// Start from the defaults.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Check the settings before binding.
    pub fn validate(&self) -> BoltResult<()> {
        if self.listen_address.is_empty() {
            return Err(BoltError::configuration("listen_address is empty"));
        }
        if self.encryption.accepts_tls() && self.tls.is_none() {
            return Err(BoltError::configuration(format!(
                "encryption is {:?} but no TLS certificate is configured",
                self.encryption
            )));
        }
        if self.max_chunk_size == 0 || self.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(BoltError::configuration(format!(
                "max_chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.max_chunk_size
            )));
        }
        if self.max_message_size == 0 {
            return Err(BoltError::configuration("max_message_size must be positive"));
        }
        if self.output_buffer_size == 0 {
            return Err(BoltError::configuration("output_buffer_size must be positive"));
        }
        if self.inbound_queue_capacity == 0 {
            return Err(BoltError::configuration("inbound_queue_capacity must be positive"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(BoltError::configuration("handshake_timeout must be positive"));
        }
        if let Some(throttle) = &self.throttle {
            throttle.validate()?;
        }
        Ok(())
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn listen_address(mut self, address: impl Into<String>) -> Self {
        self.config.listen_address = address.into();
        self
    }

    pub fn encryption(mut self, level: EncryptionLevel) -> Self {
        self.config.encryption = level;
        self
    }

    /// Set TLS material; encryption becomes optional unless already set.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        if self.config.encryption == EncryptionLevel::Disabled {
            self.config.encryption = EncryptionLevel::Optional;
        }
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.config.max_message_size = bytes;
        self
    }

    pub fn max_chunk_size(mut self, bytes: usize) -> Self {
        self.config.max_chunk_size = bytes;
        self
    }

    pub fn output_buffer_size(mut self, bytes: usize) -> Self {
        self.config.output_buffer_size = bytes;
        self
    }

    pub fn inbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_queue_capacity = capacity;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn close_flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_flush_timeout = timeout;
        self
    }

    pub fn server_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.server_agent = agent.into();
        self
    }

    /// Enable the write throttle.
    pub fn throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.config.throttle = Some(throttle);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
