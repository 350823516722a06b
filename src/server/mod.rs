//! # Bolt Server
//!
//! Runs the [`bolt`](crate::bolt) protocol core over TCP.
//!
//! - [`config`] - Server settings and builder
//! - [`connection`] - State owned by one negotiated connection
//! - [`worker`] - Per-connection reader, dispatch loop and writer
//! - [`listener`] - Accept loop

pub mod config;
pub mod connection;
pub mod listener;
pub mod worker;

pub use config::{EncryptionLevel, ServerConfig, ServerConfigBuilder};
pub use connection::Connection;
pub use listener::BoltServer;
pub use worker::ConnectionWorker;
