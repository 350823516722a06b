//! TLS acceptor built from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::Deserialize;
use tokio_rustls::TlsAcceptor;

use crate::bolt::{BoltError, BoltResult};

/// Certificate chain and private key locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsConfig {
    /// PEM file with the certificate chain, leaf first
    pub cert_path: PathBuf,
    /// PEM file with the private key (PKCS#8, PKCS#1 or SEC1)
    pub key_path: PathBuf,
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Load the files and build an acceptor.
    pub fn acceptor(&self) -> BoltResult<TlsAcceptor> {
        let certs = load_certs(&self.cert_path)?;
        let key = load_key(&self.key_path)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| BoltError::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| BoltError::Tls(e.to_string()))?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn open(path: &Path) -> BoltResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| BoltError::Tls(format!("cannot open {}: {}", path.display(), e)))
}

fn load_certs(path: &Path) -> BoltResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BoltError::Tls(format!("invalid certificate in {}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(BoltError::Tls(format!("no certificate found in {}", path.display())));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> BoltResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| BoltError::Tls(format!("invalid private key in {}: {}", path.display(), e)))?
        .ok_or_else(|| BoltError::Tls(format!("no private key found in {}", path.display())))
}
