//! TLS for intercepted `CONNECT` tunnels and for origin legs

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

const ALPN_HTTP1: &[u8] = b"http/1.1";

/// Issues a self-signed certificate per intercepted host
///
/// The renderer runs with certificate errors ignored, so the relay does not
/// need a trusted root; it only needs a certificate naming the host.
pub struct CertAuthority {
    provider: Arc<CryptoProvider>,
    configs: DashMap<String, Arc<ServerConfig>>,
}

impl std::fmt::Debug for CertAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertAuthority")
            .field("hosts", &self.configs.len())
            .finish()
    }
}

impl Default for CertAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl CertAuthority {
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            configs: DashMap::new(),
        }
    }

    /// Acceptor presenting a certificate for `host`, issued on first use
    pub fn acceptor(&self, host: &str) -> Result<TlsAcceptor> {
        if let Some(config) = self.configs.get(host) {
            return Ok(TlsAcceptor::from(Arc::clone(&config)));
        }

        let config = Arc::new(self.server_config(host)?);
        self.configs.insert(host.to_string(), Arc::clone(&config));
        Ok(TlsAcceptor::from(config))
    }

    fn server_config(&self, host: &str) -> Result<ServerConfig> {
        let issued = rcgen::generate_simple_self_signed(vec![host.to_string()])
            .with_context(|| format!("cannot issue certificate for {host}"))?;
        let cert: CertificateDer<'static> = issued.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(issued.key_pair.serialize_der()));

        let mut config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .context("TLS protocol versions")?
            .with_no_client_auth()
            .with_single_cert(vec![cert], key)
            .context("TLS server certificate")?;
        config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];
        Ok(config)
    }

    /// Connect to an origin over TLS, verifying it against the bundled web roots
    pub async fn connect_origin(&self, host: &str, port: u16) -> Result<TlsStream<TcpStream>> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .context("TLS protocol versions")?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![ALPN_HTTP1.to_vec()];

        let name = ServerName::try_from(host.to_string())
            .with_context(|| format!("invalid TLS server name {host}"))?;
        let tcp = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("cannot connect to {host}:{port}"))?;
        TlsConnector::from(Arc::new(config))
            .connect(name, tcp)
            .await
            .with_context(|| format!("TLS handshake with {host} failed"))
    }
}
