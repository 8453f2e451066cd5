//! A remote store that collects the certificate chain a TLS server presents.
//!
//! The handshake accepts whatever the server sends: the chain is only a
//! source of candidates, and every candidate is checked by the builder.

use crate::certificate::Certificate;
use crate::parser;
use crate::selector::Selector;
use crate::store::{CertificateStore, StoreError, StoreLocality};
use crate::CertPathError;
use log::{debug, info};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Connect and read timeout when none is configured.
pub const DEFAULT_TLS_TIMEOUT: Duration = Duration::from_secs(10);

const HTTPS_PORT: u16 = 443;

/// Accepts any presented chain. Handshake signatures must still verify
/// under the presented key.
#[derive(Debug)]
struct AcceptAnyChain(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyChain {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Certificates presented by a TLS server, fetched on first query.
///
/// The store is [`StoreLocality::Remote`]. Connecting, the handshake and
/// every read and write are bounded by the store's timeout. A successful
/// fetch is kept for the life of the store; a failed one is retried on the
/// next query.
pub struct TlsServerStore {
    name: String,
    host: String,
    port: u16,
    timeout: Duration,
    config: Arc<ClientConfig>,
    chain: OnceLock<Vec<Arc<Certificate>>>,
}

impl std::fmt::Debug for TlsServerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsServerStore")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("fetched", &self.chain.get().map(Vec::len))
            .finish()
    }
}

impl TlsServerStore {
    pub fn new(host: &str, port: u16) -> Result<Self, CertPathError> {
        if host.is_empty() {
            return Err(CertPathError::InvalidConfiguration(
                "TLS store needs a host".into(),
            ));
        }
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| CertPathError::InvalidConfiguration(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyChain(provider)))
            .with_no_client_auth();
        Ok(TlsServerStore {
            name: format!("tls:{}:{}", host, port),
            host: host.to_string(),
            port,
            timeout: DEFAULT_TLS_TIMEOUT,
            config: Arc::new(config),
            chain: OnceLock::new(),
        })
    }

    /// Parse `https://host[:port][/path]`. The port defaults to 443 and the
    /// path is ignored. IPv6 hosts go in brackets.
    pub fn from_url(url: &str) -> Result<Self, CertPathError> {
        let (host, port) = parse_https_url(url)?;
        TlsServerStore::new(&host, port)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn connect(&self) -> std::io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(sock) => {
                    sock.set_read_timeout(Some(self.timeout))?;
                    sock.set_write_timeout(Some(self.timeout))?;
                    return Ok(sock);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "host has no addresses")
        }))
    }

    /// Run a handshake and return the server's chain, end entity first.
    fn fetch(&self) -> Result<Vec<Arc<Certificate>>, String> {
        let server_name =
            ServerName::try_from(self.host.clone()).map_err(|e| format!("bad host: {}", e))?;
        let mut sock = self.connect().map_err(|e| format!("connect: {}", e))?;
        let mut conn = ClientConnection::new(self.config.clone(), server_name)
            .map_err(|e| format!("tls: {}", e))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut sock)
                .map_err(|e| format!("handshake: {}", e))?;
        }
        let presented = conn
            .peer_certificates()
            .map(<[CertificateDer<'static>]>::to_vec)
            .unwrap_or_default();
        conn.send_close_notify();
        if conn.write_tls(&mut sock).is_ok() {
            let _ = sock.flush();
        }

        let mut chain = Vec::with_capacity(presented.len());
        for der in &presented {
            match parser::parse_der(der.as_ref()) {
                Ok(cert) => chain.push(Arc::new(cert)),
                Err(e) => debug!("{}: skipping unparsable certificate: {}", self.name, e),
            }
        }
        info!("{}: server presented {} certificates", self.name, chain.len());
        Ok(chain)
    }
}

impl CertificateStore for TlsServerStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn locality(&self) -> StoreLocality {
        StoreLocality::Remote
    }

    fn query(&self, selector: &Selector) -> Result<Vec<Arc<Certificate>>, StoreError> {
        let chain = match self.chain.get() {
            Some(chain) => chain,
            None => {
                let fetched = self
                    .fetch()
                    .map_err(|message| StoreError::new(&self.name, message))?;
                self.chain.get_or_init(|| fetched)
            }
        };
        Ok(chain
            .iter()
            .filter(|c| selector.matches(c))
            .cloned()
            .collect())
    }
}

fn parse_https_url(url: &str) -> Result<(String, u16), CertPathError> {
    let invalid = |why: &str| CertPathError::InvalidConfiguration(format!("{}: {}", url, why));
    let rest = url
        .get(..8)
        .filter(|scheme| scheme.eq_ignore_ascii_case("https://"))
        .and_then(|_| url.get(8..))
        .ok_or_else(|| invalid("expected an https:// URL"))?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid("unterminated IPv6 address"))?;
        (host, after.strip_prefix(':'))
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port = match port {
        Some(p) => p.parse::<u16>().map_err(|_| invalid("bad port"))?,
        None => HTTPS_PORT,
    };
    Ok((host.to_string(), port))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn url_host_and_port() {
        assert_eq!(
            parse_https_url("https://example.com").unwrap(),
            ("example.com".to_string(), 443)
        );
        assert_eq!(
            parse_https_url("HTTPS://example.com:8443/ca/issuer.cer").unwrap(),
            ("example.com".to_string(), 8443)
        );
        assert_eq!(
            parse_https_url("https://[::1]:4433").unwrap(),
            ("::1".to_string(), 4433)
        );
        assert_eq!(
            parse_https_url("https://user@10.0.0.1?x=1").unwrap(),
            ("10.0.0.1".to_string(), 443)
        );
    }

    #[test]
    fn url_rejects() {
        for url in ["http://example.com", "example.com", "https://", "https://h:99999"] {
            assert!(
                matches!(
                    parse_https_url(url),
                    Err(CertPathError::InvalidConfiguration(_))
                ),
                "{url}"
            );
        }
    }

    #[test]
    fn store_is_remote() {
        let store = TlsServerStore::from_url("https://ca.example:8443").unwrap();
        assert_eq!(store.locality(), StoreLocality::Remote);
        assert_eq!(store.name(), "tls:ca.example:8443");
        assert_eq!(store.host(), "ca.example");
        assert_eq!(store.port(), 8443);
    }

    #[test]
    fn refused_connection_is_a_store_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = TlsServerStore::new("127.0.0.1", port)
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        let err = store.query(&Selector::subject("CN=A")).unwrap_err();
        assert_eq!(err.store, store.name());
        assert!(err.message.starts_with("connect"), "{}", err.message);
    }

    #[test]
    fn silent_server_times_out() {
        // Accepted by the kernel backlog but never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let store = TlsServerStore::new("127.0.0.1", port)
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let err = store.query(&Selector::subject("CN=A")).unwrap_err();
        assert!(err.message.starts_with("handshake"), "{}", err.message);
        drop(listener);
    }
}
