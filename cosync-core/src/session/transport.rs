//! Connecting to the relay: plain TCP, or TLS with a plain fallback.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

use super::SessionConfig;
use crate::error::SyncError;

/// Anything the session can read frames from and write frames to.
pub trait RelayStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RelayStream for T {}

pub type BoxedStream = Box<dyn RelayStream>;

/// An established relay connection.
pub struct Connected {
    pub stream: BoxedStream,
    /// Whether the link is encrypted.
    pub secure: bool,
    /// Set when TLS was requested but the link fell back to plain TCP.
    pub fallback: Option<String>,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("secure", &self.secure)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Open a connection as described by `config`.
///
/// A TLS failure of any kind (bad certificate file, handshake error) is
/// not fatal: the partial stream is dropped and a fresh plain connection
/// is made instead.
pub async fn connect(config: &SessionConfig) -> Result<Connected, SyncError> {
    let tcp = connect_tcp(config).await?;
    if !config.use_tls {
        info!(host = %config.relay_host, port = config.relay_port, "connected (plain)");
        return Ok(Connected {
            stream: Box::new(tcp),
            secure: false,
            fallback: None,
        });
    }

    match handshake(tcp, config).await {
        Ok(tls) => {
            info!(host = %config.relay_host, port = config.relay_port, "connected (tls)");
            Ok(Connected {
                stream: Box::new(tls),
                secure: true,
                fallback: None,
            })
        }
        Err(e) => {
            warn!(error = %e, "tls negotiation failed, retrying without encryption");
            let tcp = connect_tcp(config).await?;
            Ok(Connected {
                stream: Box::new(tcp),
                secure: false,
                fallback: Some(format!(
                    "encrypted connection failed ({e}); continuing unencrypted"
                )),
            })
        }
    }
}

async fn connect_tcp(config: &SessionConfig) -> Result<TcpStream, SyncError> {
    let addr = (config.relay_host.as_str(), config.relay_port);
    debug!(host = %config.relay_host, port = config.relay_port, "opening tcp connection");
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| SyncError::ConnectTimeout(config.connect_timeout))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn handshake(
    tcp: TcpStream,
    config: &SessionConfig,
) -> Result<TlsStream<TcpStream>, SyncError> {
    let tls = client_config(config.certificate.as_deref())?;
    let name = ServerName::try_from(config.relay_host.clone())
        .map_err(|e| SyncError::Tls(format!("invalid server name: {e}")))?;
    let stream = TlsConnector::from(Arc::new(tls))
        .connect(name, tcp)
        .await
        .map_err(|e| SyncError::Tls(e.to_string()))?;
    Ok(stream)
}

/// Build the rustls client config, trusting either the PEM bundle at
/// `certificate` or the bundled web PKI roots.
pub fn client_config(certificate: Option<&Path>) -> Result<rustls::ClientConfig, SyncError> {
    let mut roots = RootCertStore::empty();
    match certificate {
        Some(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| SyncError::Certificate(format!("{}: {e}", path.display())))?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert =
                    cert.map_err(|e| SyncError::Certificate(format!("{}: {e}", path.display())))?;
                roots.add(cert)?;
            }
            if roots.is_empty() {
                return Err(SyncError::Certificate(format!(
                    "no certificates found in {}",
                    path.display()
                )));
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn config_for(port: u16, use_tls: bool) -> SessionConfig {
        SessionConfig {
            identity: "u1".into(),
            relay_host: "127.0.0.1".into(),
            relay_port: port,
            use_tls,
            connect_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn default_roots_build_a_config() {
        assert!(client_config(None).is_ok());
    }

    #[test]
    fn missing_certificate_file_is_a_certificate_error() {
        let err = client_config(Some(Path::new("/nonexistent/cosync-ca.pem"))).unwrap_err();
        assert!(matches!(err, SyncError::Certificate(_)));
    }

    #[tokio::test]
    async fn plain_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connected = connect(&config_for(port, false)).await.unwrap();
        assert!(!connected.secure);
        assert!(connected.fallback.is_none());
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn tls_failure_falls_back_to_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // First connection: answer the ClientHello with garbage and hang up.
        // Second connection: stays open as the plain fallback.
        let relay = tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            let mut hello = [0u8; 512];
            let _ = first.read(&mut hello).await;
            drop(first);
            let (second, _) = listener.accept().await.unwrap();
            second
        });

        let connected = connect(&config_for(port, true)).await.unwrap();
        assert!(!connected.secure);
        assert!(connected.fallback.is_some());
        relay.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect(&config_for(port, false)).await.unwrap_err();
        assert!(err.is_transport());
    }
}
