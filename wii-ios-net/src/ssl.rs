//! `/dev/net/ssl` sessions: TLS client connections driven over the host
//! socket that backs a Wii socket.
//!
//! Handshakes, reads and writes never block. They return `SSL_ERR_RAGAIN`
//! or `SSL_ERR_WAGAIN` when the socket is not ready, and the owning
//! [`WiiSocket`](crate::WiiSocket) retries them on the next update.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore,
    SignatureScheme,
};
use socket2::Socket;

use crate::sys::HostStream;

pub const NET_SSL_MAX_INSTANCES: usize = 4;

pub const SSL_OK: i32 = 0;
pub const SSL_ERR_FAILED: i32 = -1;
pub const SSL_ERR_RAGAIN: i32 = -2;
pub const SSL_ERR_WAGAIN: i32 = -3;
pub const SSL_ERR_SYSCALL: i32 = -5;
pub const SSL_ERR_ZERO: i32 = -6;
pub const SSL_ERR_CAGAIN: i32 = -7;
pub const SSL_ERR_ID: i32 = -8;
pub const SSL_ERR_VCOMMONNAME: i32 = -9;
pub const SSL_ERR_VROOTCA: i32 = -10;
pub const SSL_ERR_VCHAIN: i32 = -11;
pub const SSL_ERR_VDATE: i32 = -12;
pub const SSL_ERR_SERVER_CERT: i32 = -13;

/// Guest-visible result for a TLS failure.
pub fn ssl_error_code(err: &rustls::Error) -> i32 {
    let rustls::Error::InvalidCertificate(cert) = err else {
        return SSL_ERR_FAILED;
    };
    match cert {
        CertificateError::NotValidForName => SSL_ERR_VCOMMONNAME,
        CertificateError::UnknownIssuer => SSL_ERR_VROOTCA,
        CertificateError::Revoked => SSL_ERR_VCHAIN,
        CertificateError::Expired | CertificateError::NotValidYet => SSL_ERR_VDATE,
        other => {
            // Newer rustls releases attach context to these as separate variants.
            let name = format!("{other:?}");
            if name.starts_with("NotValidForName") {
                SSL_ERR_VCOMMONNAME
            } else if name.starts_with("NotValidYet")
                || (name.starts_with("Expired") && !name.starts_with("ExpiredRevocationList"))
            {
                SSL_ERR_VDATE
            } else {
                SSL_ERR_FAILED
            }
        }
    }
}

fn would_block(e: &io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
}

/// Accepts every server certificate while still checking handshake
/// signatures. Used when the guest or the user turns verification off.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn build_config(verify: bool) -> Result<Arc<ClientConfig>, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;
    let config = if verify {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth()
    };
    Ok(Arc::new(config))
}

#[derive(Debug)]
struct SslSession {
    hostname: String,
    wii_fd: Option<i32>,
    conn: ClientConnection,
}

impl SslSession {
    /// Push buffered TLS records to the socket until done or it would block.
    fn flush_pending(&mut self, host: &Socket) -> io::Result<()> {
        let mut io = HostStream(host);
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut io) {
                Ok(_) => {}
                Err(e) if would_block(&e) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Pull one batch of records from the socket. `Ok(false)` means EOF.
    fn fill(&mut self, host: &Socket) -> Result<bool, i32> {
        let mut io = HostStream(host);
        match self.conn.read_tls(&mut io) {
            Ok(0) => Ok(false),
            Ok(_) => match self.conn.process_new_packets() {
                Ok(_) => Ok(true),
                Err(e) => {
                    log::warn!("SSL error for {}: {e}", self.hostname);
                    // Best effort to deliver the alert.
                    let _ = self.flush_pending(host);
                    Err(ssl_error_code(&e))
                }
            },
            Err(e) if would_block(&e) => Err(SSL_ERR_RAGAIN),
            Err(e) => {
                log::warn!("SSL socket read for {} failed: {e}", self.hostname);
                Err(SSL_ERR_SYSCALL)
            }
        }
    }

    fn handshake(&mut self, host: &Socket) -> i32 {
        loop {
            let mut io = HostStream(host);
            while self.conn.wants_write() {
                match self.conn.write_tls(&mut io) {
                    Ok(_) => {}
                    Err(e) if would_block(&e) => return SSL_ERR_WAGAIN,
                    Err(e) => {
                        log::warn!("SSL handshake write for {} failed: {e}", self.hostname);
                        return SSL_ERR_SYSCALL;
                    }
                }
            }
            if !self.conn.is_handshaking() {
                log::info!("SSL handshake with {} complete", self.hostname);
                return SSL_OK;
            }
            match self.fill(host) {
                Ok(true) => {}
                Ok(false) => {
                    log::warn!("{} closed the connection during the handshake", self.hostname);
                    return SSL_ERR_FAILED;
                }
                Err(code) => return code,
            }
        }
    }

    fn read(&mut self, host: &Socket, buf: &mut [u8]) -> i32 {
        if let Err(e) = self.flush_pending(host) {
            log::warn!("SSL flush for {} failed: {e}", self.hostname);
            return SSL_ERR_SYSCALL;
        }
        loop {
            match self.conn.reader().read(buf) {
                Ok(0) => return SSL_ERR_ZERO,
                Ok(n) => return n as i32,
                Err(e) if would_block(&e) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return SSL_ERR_ZERO,
                Err(e) => {
                    log::warn!("SSL read from {} failed: {e}", self.hostname);
                    return SSL_ERR_FAILED;
                }
            }
            match self.fill(host) {
                Ok(true) => {}
                Ok(false) => return SSL_ERR_ZERO,
                Err(code) => return code,
            }
        }
    }

    fn write(&mut self, host: &Socket, data: &[u8]) -> i32 {
        if data.is_empty() {
            return SSL_ERR_ZERO;
        }
        let accepted = match self.conn.writer().write(data) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("SSL write to {} failed: {e}", self.hostname);
                return SSL_ERR_FAILED;
            }
        };
        if let Err(e) = self.flush_pending(host) {
            log::warn!("SSL flush for {} failed: {e}", self.hostname);
            return SSL_ERR_SYSCALL;
        }
        if accepted == 0 {
            SSL_ERR_WAGAIN
        } else {
            accepted as i32
        }
    }
}

/// The four SSL contexts a guest can have open. Ids handed to the guest
/// are slot + 1; every method here takes the zero-based slot.
#[derive(Debug, Default)]
pub struct SslSessions {
    slots: [Option<SslSession>; NET_SSL_MAX_INSTANCES],
    /// When false, peer verification is skipped no matter what the guest asks.
    verify_peers: bool,
    verifying: Option<Arc<ClientConfig>>,
    permissive: Option<Arc<ClientConfig>>,
}

impl SslSessions {
    pub fn new(verify_peers: bool) -> Self {
        Self {
            verify_peers,
            ..Self::default()
        }
    }

    pub fn set_verify_peers(&mut self, verify: bool) {
        self.verify_peers = verify;
    }

    fn config(&mut self, verify: bool) -> Result<Arc<ClientConfig>, rustls::Error> {
        let cache = if verify {
            &mut self.verifying
        } else {
            &mut self.permissive
        };
        if let Some(config) = cache {
            return Ok(config.clone());
        }
        let config = build_config(verify)?;
        *cache = Some(config.clone());
        Ok(config)
    }

    fn session_mut(&mut self, ssl_id: i32) -> Option<&mut SslSession> {
        let index = usize::try_from(ssl_id).ok()?;
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn is_valid_id(&self, ssl_id: i32) -> bool {
        usize::try_from(ssl_id)
            .ok()
            .and_then(|i| self.slots.get(i))
            .is_some_and(Option::is_some)
    }

    /// Allocate a context for `hostname`. Returns the guest id (slot + 1)
    /// or `SSL_ERR_FAILED`.
    pub fn create(&mut self, hostname: &str, verify_option: u32) -> i32 {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            log::error!("SSL_NEW: all {NET_SSL_MAX_INSTANCES} contexts are in use");
            return SSL_ERR_FAILED;
        };
        let verify = self.verify_peers && verify_option != 0;
        let config = match self.config(verify) {
            Ok(config) => config,
            Err(e) => {
                log::error!("SSL_NEW: failed to build TLS config: {e}");
                return SSL_ERR_FAILED;
            }
        };
        let name = match ServerName::try_from(hostname.to_string()) {
            Ok(name) => name,
            Err(e) => {
                log::warn!("SSL_NEW: invalid hostname {hostname:?}: {e}");
                return SSL_ERR_FAILED;
            }
        };
        let conn = match ClientConnection::new(config, name) {
            Ok(conn) => conn,
            Err(e) => {
                log::error!("SSL_NEW: {e}");
                return SSL_ERR_FAILED;
            }
        };
        log::info!("SSL_NEW: context {} for {hostname} (verify: {verify})", slot + 1);
        self.slots[slot] = Some(SslSession {
            hostname: hostname.to_string(),
            wii_fd: None,
            conn,
        });
        slot as i32 + 1
    }

    /// Bind a context to a Wii socket. Records travel over that socket's
    /// host socket, handed in by the caller on every operation.
    pub fn connect(&mut self, ssl_id: i32, wii_fd: i32) -> i32 {
        match self.session_mut(ssl_id) {
            Some(session) => {
                session.wii_fd = Some(wii_fd);
                SSL_OK
            }
            None => SSL_ERR_ID,
        }
    }

    /// Wii socket a context is bound to.
    pub fn wii_fd(&self, ssl_id: i32) -> Option<i32> {
        usize::try_from(ssl_id)
            .ok()
            .and_then(|i| self.slots.get(i))?
            .as_ref()?
            .wii_fd
    }

    /// Drop a context, sending `close_notify` over `host` when the
    /// context is still bound to an open socket.
    pub fn shutdown(&mut self, ssl_id: i32, host: Option<&Socket>) -> i32 {
        let Some(session) = self.session_mut(ssl_id) else {
            return SSL_ERR_ID;
        };
        if let (Some(_), Some(host)) = (session.wii_fd, host) {
            session.conn.send_close_notify();
            let _ = session.flush_pending(host);
        }
        self.slots[ssl_id as usize] = None;
        SSL_OK
    }

    pub fn handshake(&mut self, ssl_id: i32, host: &Socket) -> i32 {
        match self.session_mut(ssl_id) {
            Some(session) if session.wii_fd.is_some() => session.handshake(host),
            Some(_) => SSL_ERR_SYSCALL,
            None => SSL_ERR_ID,
        }
    }

    pub fn read(&mut self, ssl_id: i32, host: &Socket, buf: &mut [u8]) -> i32 {
        match self.session_mut(ssl_id) {
            Some(session) if session.wii_fd.is_some() => session.read(host, buf),
            Some(_) => SSL_ERR_SYSCALL,
            None => SSL_ERR_ID,
        }
    }

    pub fn write(&mut self, ssl_id: i32, host: &Socket, data: &[u8]) -> i32 {
        match self.session_mut(ssl_id) {
            Some(session) if session.wii_fd.is_some() => session.write(host, data),
            Some(_) => SSL_ERR_SYSCALL,
            None => SSL_ERR_ID,
        }
    }

    /// Push any records left buffered by earlier non-blocking writes.
    /// `host_socket` resolves a Wii fd to its host socket.
    pub fn flush_all<'s>(&mut self, host_socket: impl Fn(i32) -> Option<&'s Socket>) {
        for session in self.slots.iter_mut().flatten() {
            let Some(host) = session.wii_fd.and_then(&host_socket) else {
                continue;
            };
            if let Err(e) = session.flush_pending(host) {
                log::warn!("SSL flush for {} failed: {e}", session.hostname);
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}
