//! TCP accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use super::config::ServerConfig;
use super::worker::ConnectionWorker;
use crate::bolt::{BoltResult, ProtocolRegistry};

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bolt server bound to a TCP address.
///
/// Each accepted socket gets its own task and a connection id of the form
/// `bolt-<n>`, increasing from 1 for the life of the server.
pub struct BoltServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    registry: Arc<ProtocolRegistry>,
    tls: Option<TlsAcceptor>,
    next_id: AtomicU64,
}

impl BoltServer {
    /// Validate `config`, load TLS material and bind the listen address.
    pub async fn bind(config: ServerConfig, registry: ProtocolRegistry) -> BoltResult<Self> {
        config.validate()?;

        let tls = match &config.tls {
            Some(tls) if config.encryption.accepts_tls() => Some(tls.acceptor()?),
            _ => None,
        };
        let listener = TcpListener::bind(&config.listen_address).await?;
        info!(
            address = %listener.local_addr()?,
            versions = ?registry.versions(),
            encryption = ?config.encryption,
            "Bolt server listening"
        );

        Ok(Self {
            listener,
            config: Arc::new(config),
            registry: Arc::new(registry),
            tls,
            next_id: AtomicU64::new(1),
        })
    }

    /// Address actually bound; useful with port 0.
    pub fn local_addr(&self) -> BoltResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Accept connections forever.
    pub async fn serve(self) -> BoltResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes, then close every
    /// open connection.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> BoltResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "TCP_NODELAY not set");
                    }
                    let worker = ConnectionWorker::new(
                        self.next_connection_id(),
                        peer.to_string(),
                        Arc::clone(&self.config),
                        Arc::clone(&self.registry),
                        self.tls.clone(),
                    );
                    debug!(id = worker.id(), %peer, "connection accepted");
                    connections.spawn(async move {
                        // Outcome already logged inside the connection span
                        let _ = worker.run(stream).await;
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            warn!(error = %e, "connection task panicked");
                        }
                    }
                }
            }
        }

        info!(open = connections.len(), "Bolt server shutting down");
        connections.shutdown().await;
        Ok(())
    }

    fn next_connection_id(&self) -> String {
        format!("bolt-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}
