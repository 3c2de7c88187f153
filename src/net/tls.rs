//! TLS context construction and certificate loading.
//!
//! A secure listener builds one TLS context per `open()`. The host may
//! customize it (certificates, client verification, ALPN) through the
//! context callback before it is finalized into the acceptor.

use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Once};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::danger::ClientCertVerifier;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Error type for TLS context construction.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Failed to read a certificate or key file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The certificate file held no certificates.
    #[error("no certificates found in {0}")]
    EmptyCertChain(String),
    /// The finalized context holds no certificate chain.
    #[error("secure listener has no certificate configured")]
    MissingCertificate,
    /// The finalized context holds no private key.
    #[error("secure listener has no private key configured")]
    MissingPrivateKey,
    /// rustls rejected the certificate/key material.
    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

/// Invoked once per constructed TLS context, before it is finalized.
pub type TlsContextCallback = Arc<dyn Fn(&mut TlsContext) + Send + Sync>;

/// Mutable TLS settings for a secure listener.
///
/// Handed to the host's context callback; finalized into a
/// `rustls::ServerConfig` afterwards. A context that ends up without a
/// certificate chain and private key fails the listener's `open()`.
#[derive(Default)]
pub struct TlsContext {
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: Option<PrivateKeyDer<'static>>,
    alpn_protocols: Vec<Vec<u8>>,
    client_cert_verifier: Option<Arc<dyn ClientCertVerifier>>,
}

impl TlsContext {
    /// Replace the certificate chain presented to clients.
    pub fn set_certificate_chain(&mut self, chain: Vec<CertificateDer<'static>>) {
        self.cert_chain = chain;
    }

    /// Set the private key matching the certificate chain.
    pub fn set_private_key(&mut self, key: PrivateKeyDer<'static>) {
        self.private_key = Some(key);
    }

    /// Set the ALPN protocols offered during the handshake.
    pub fn set_alpn_protocols(&mut self, protocols: Vec<Vec<u8>>) {
        self.alpn_protocols = protocols;
    }

    /// Require and verify client certificates.
    pub fn set_client_cert_verifier(&mut self, verifier: Arc<dyn ClientCertVerifier>) {
        self.client_cert_verifier = Some(verifier);
    }

    /// Load certificate chain and private key from PEM files.
    pub fn load_pem_files(&mut self, cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
        self.cert_chain = load_certs(cert_path)?;
        self.private_key = Some(load_key(key_path)?);
        Ok(())
    }

    fn into_server_config(self) -> Result<rustls::ServerConfig, TlsError> {
        if self.cert_chain.is_empty() {
            return Err(TlsError::MissingCertificate);
        }
        let key = self.private_key.ok_or(TlsError::MissingPrivateKey)?;
        let builder = rustls::ServerConfig::builder();
        let mut config = match self.client_cert_verifier {
            Some(verifier) => builder.with_client_cert_verifier(verifier),
            None => builder.with_no_client_auth(),
        }
        .with_single_cert(self.cert_chain, key)?;
        config.alpn_protocols = self.alpn_protocols;
        Ok(config)
    }
}

/// Build the acceptor for a secure listener: default context, host
/// customization, finalization.
pub(crate) fn build_acceptor(
    callback: Option<&TlsContextCallback>,
) -> Result<TlsAcceptor, TlsError> {
    ensure_crypto_provider();
    let mut context = TlsContext::default();
    if let Some(callback) = callback {
        callback(&mut context);
    }
    let config = context.into_server_config()?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Install the ring crypto provider process-wide, once. Keeps the provider
/// deterministic regardless of which rustls features end up enabled.
fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCertChain(path.display().to_string()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = std::fs::File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or(TlsError::MissingPrivateKey)
}
