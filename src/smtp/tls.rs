//! TLS material loading and the plain/TLS connection stream

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig as TlsServerConfig, ServerConnection, StreamOwned};

use crate::smtp::error::SmtpError;

/// Load a PEM certificate chain and private key into a server configuration.
pub fn load_tls_config(cert: &Path, key: &Path) -> Result<Arc<TlsServerConfig>, SmtpError> {
    let certs = CertificateDer::pem_file_iter(cert)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| SmtpError::TlsConfig(format!("{}: {e}", cert.display())))?;
    if certs.is_empty() {
        return Err(SmtpError::TlsConfig(format!(
            "{}: no certificate found",
            cert.display()
        )));
    }

    let key = PrivateKeyDer::from_pem_file(key)
        .map_err(|e| SmtpError::TlsConfig(format!("{}: {e}", key.display())))?;

    tls_config_from_der(certs, key)
}

/// Build a server configuration from DER material.
pub fn tls_config_from_der(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<TlsServerConfig>, SmtpError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = TlsServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SmtpError::TlsConfig(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| SmtpError::TlsConfig(e.to_string()))?;
    Ok(Arc::new(config))
}

/// A client connection, either in clear or wrapped in TLS
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl Connection {
    /// Wrap `self` in a server-side TLS session and complete the handshake.
    pub fn upgrade(self, config: Arc<TlsServerConfig>) -> Result<Connection, SmtpError> {
        let tcp = match self {
            Connection::Plain(tcp) => tcp,
            Connection::Tls(_) => {
                return Err(SmtpError::InvalidState("Already running in TLS".into()));
            }
        };
        let conn = ServerConnection::new(config)
            .map_err(|e| SmtpError::TlsConfig(e.to_string()))?;
        let mut stream = StreamOwned::new(conn, tcp);
        while stream.conn.is_handshaking() {
            stream
                .conn
                .complete_io(&mut stream.sock)
                .map_err(SmtpError::Io)?;
        }
        Ok(Connection::Tls(Box::new(stream)))
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Connection::Tls(_))
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.read(buf),
            Connection::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.write(buf),
            Connection::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(s) => s.flush(),
            Connection::Tls(s) => s.flush(),
        }
    }
}
