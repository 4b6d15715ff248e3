//! TLS configuration, certificate loading and non-blocking TLS streams.
//!
//! # Responsibilities
//! - Load certificate chains, private keys and trust bundles from PEM
//! - Build server (`TlsAcceptor`) and client (`TlsConnector`) sessions
//! - Drive the handshake without blocking the event loop
//! - Present an established session as a plain `Read + Write` byte stream

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, Connection, RootCertStore, ServerConfig, ServerConnection};

use crate::config::TlsConfig;
use crate::error::{HandshakeError, TlsSetupError};
use crate::net::stream::ByteStream;

fn read_file(path: &Path) -> Result<Vec<u8>, TlsSetupError> {
    let mut data = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut data))
        .map_err(|source| TlsSetupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(data)
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsSetupError::Pem)?;
    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificates);
    }
    Ok(certs)
}

/// Sessions always use `ring`, whatever other providers are compiled in.
fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsSetupError> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(TlsSetupError::Pem)?
        .ok_or(TlsSetupError::NoPrivateKey)
}

/// Server side of the adapter: presents a certificate and key.
#[derive(Clone)]
pub struct TlsAcceptor {
    config: Arc<ServerConfig>,
}

impl TlsAcceptor {
    /// Build an acceptor from PEM-encoded certificate chain and private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsSetupError> {
        let certs = parse_certs(cert_pem)?;
        let key = parse_key(key_pem)?;
        let config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Load certificate and key files.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsSetupError> {
        Self::from_pem(&read_file(cert_path)?, &read_file(key_path)?)
    }

    /// Build an acceptor from configuration, or `None` when TLS is disabled.
    pub fn from_config(config: &TlsConfig) -> Result<Option<Self>, TlsSetupError> {
        if !config.enabled {
            return Ok(None);
        }
        let cert = config.cert_path.as_deref().ok_or(TlsSetupError::Missing("tls.cert_path"))?;
        let key = config.key_path.as_deref().ok_or(TlsSetupError::Missing("tls.key_path"))?;
        Self::from_pem_files(Path::new(cert), Path::new(key)).map(Some)
    }

    /// Start a server session over an accepted socket. The handshake has not
    /// run yet; drive it with [`TlsStream::advance_handshake`].
    pub fn accept(&self, sock: TcpStream) -> Result<TlsStream, HandshakeError> {
        let session = ServerConnection::new(Arc::clone(&self.config))?;
        Ok(TlsStream::new(sock, session.into()))
    }
}

impl fmt::Debug for TlsAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsAcceptor").finish()
    }
}

/// Client side of the adapter: validates the server against a trust bundle.
#[derive(Clone)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
}

impl TlsConnector {
    /// Build a connector trusting the PEM-encoded certificates in `ca_pem`
    /// and expecting the server to identify as `server_name`.
    pub fn from_pem(ca_pem: &[u8], server_name: &str) -> Result<Self, TlsSetupError> {
        let mut roots = RootCertStore::empty();
        for cert in parse_certs(ca_pem)? {
            roots.add(cert)?;
        }
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsSetupError::InvalidServerName(server_name.to_string()))?;
        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            config: Arc::new(config),
            server_name,
        })
    }

    pub fn from_pem_file(ca_path: &Path, server_name: &str) -> Result<Self, TlsSetupError> {
        Self::from_pem(&read_file(ca_path)?, server_name)
    }

    /// Build a connector from configuration, or `None` when TLS is disabled.
    /// `default_name` is used when no explicit `server_name` is configured.
    pub fn from_config(config: &TlsConfig, default_name: &str) -> Result<Option<Self>, TlsSetupError> {
        if !config.enabled {
            return Ok(None);
        }
        let ca = config.ca_path.as_deref().ok_or(TlsSetupError::Missing("tls.ca_path"))?;
        let name = config.server_name.as_deref().unwrap_or(default_name);
        Self::from_pem_file(Path::new(ca), name).map(Some)
    }

    /// Start a client session over a connected socket.
    pub fn connect(&self, sock: TcpStream) -> Result<TlsStream, HandshakeError> {
        let session = ClientConnection::new(Arc::clone(&self.config), self.server_name.clone())?;
        Ok(TlsStream::new(sock, session.into()))
    }
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector")
            .field("server_name", &self.server_name)
            .finish()
    }
}

/// A TLS session over a non-blocking TCP socket.
pub struct TlsStream {
    sock: TcpStream,
    session: Connection,
}

impl TlsStream {
    fn new(sock: TcpStream, session: Connection) -> Self {
        Self { sock, session }
    }

    /// Make as much handshake progress as the socket allows.
    ///
    /// Returns `Ok(true)` once the session is established, `Ok(false)` if the
    /// handshake is waiting for the peer.
    pub fn advance_handshake(&mut self) -> Result<bool, HandshakeError> {
        self.write_ciphertext()?;
        while self.session.is_handshaking() {
            match self.session.read_tls(&mut self.sock) {
                Ok(0) => return Err(HandshakeError::PeerClosed),
                Ok(_) => {
                    if let Err(err) = self.session.process_new_packets() {
                        // Best effort: let the peer see the alert.
                        let _ = self.write_ciphertext();
                        return Err(err.into());
                    }
                    self.write_ciphertext()?;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        self.write_ciphertext()?;
        Ok(!self.session.is_handshaking())
    }

    /// Push buffered ciphertext to the socket until it would block.
    fn write_ciphertext(&mut self) -> io::Result<()> {
        while self.session.wants_write() {
            match self.session.write_tls(&mut self.sock) {
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.session.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => return Err(err),
            }

            // No plaintext buffered; pull more ciphertext off the socket.
            match self.session.read_tls(&mut self.sock) {
                Ok(0) => return Ok(0),
                Ok(_) => {
                    self.session
                        .process_new_packets()
                        .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
                    self.write_ciphertext()?;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut n = self.session.writer().write(buf)?;
        if n == 0 && !buf.is_empty() {
            // Plaintext buffer is full; drain ciphertext and retry once.
            self.write_ciphertext()?;
            n = self.session.writer().write(buf)?;
            if n == 0 {
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
        }
        self.write_ciphertext()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_ciphertext()
    }
}

impl ByteStream for TlsStream {
    fn has_pending_output(&self) -> bool {
        self.session.wants_write()
    }
}

impl Source for TlsStream {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.sock.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.sock.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.sock.deregister(registry)
    }
}

impl fmt::Debug for TlsStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsStream")
            .field("sock", &self.sock)
            .field("handshaking", &self.session.is_handshaking())
            .finish()
    }
}
