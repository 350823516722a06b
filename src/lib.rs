//! # Zeta4G Bolt Server
//!
//! Server-side wire protocol engine for [Zeta4G](https://github.com/zeta9044/zeta4g):
//! transport detection, version handshake, chunk framing, output
//! backpressure and the per-connection Bolt state machine.
//!
//! ## Features
//!
//! - **Bolt 1 through 4.0** - Version negotiation in client preference order
//! - **Transports** - Raw TCP, TLS and WebSocket, detected from the first bytes
//! - **Async** - One Tokio task per connection, strict per-connection ordering
//! - **Backpressure** - Watermark write throttle with a bounded wait
//! - **Pluggable engine** - Statements run behind the [`QueryExecutor`] trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zeta4g_bolt_server::{BoltServer, ProtocolRegistry, QueryExecutor, ServerConfig};
//! # use zeta4g_bolt_server::bolt::state::{ExecResult, ResultStream, TransactionContext, RecordBuffer};
//! # use zeta4g_bolt_server::bolt::message::BeginMessage;
//! # use zeta4g_bolt_server::PackStreamValue;
//! # use std::collections::HashMap;
//! # struct Engine;
//! # impl QueryExecutor for Engine {
//! #     fn run(&mut self, _: &str, _: &HashMap<String, PackStreamValue>, _: TransactionContext)
//! #         -> ExecResult<Box<dyn ResultStream>> { Ok(Box::new(RecordBuffer::default())) }
//! #     fn begin(&mut self, _: &BeginMessage) -> ExecResult<()> { Ok(()) }
//! #     fn commit(&mut self) -> ExecResult<Option<String>> { Ok(None) }
//! #     fn rollback(&mut self) -> ExecResult<()> { Ok(()) }
//! #     fn reset(&mut self) -> ExecResult<()> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ProtocolRegistry::with_defaults(Arc::new(
//!         |_: &str| -> Box<dyn QueryExecutor> { Box::new(Engine) },
//!     ));
//!
//!     let config = ServerConfig::builder()
//!         .listen_address("127.0.0.1:7687")
//!         .build();
//!
//!     let server = BoltServer::bind(config, registry).await?;
//!     server.serve_with_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`bolt`] - Protocol core: transport, handshake, codecs, state machine
//! - [`server`] - Configuration, connection worker and accept loop

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod server;

pub use bolt::{
    BoltError, BoltErrorCode, BoltResult, ExecutionError, PackStreamValue, ProtocolRegistry,
    ProtocolVersion, QueryExecutor, ThrottleConfig, TlsConfig,
};
pub use server::{BoltServer, EncryptionLevel, ServerConfig, ServerConfigBuilder};
