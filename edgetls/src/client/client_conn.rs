use std::fmt::Debug;
use std::sync::Arc;

use pki_types::UnixTime;

use super::handy::NoClientSessionStorage;
use crate::crypto::sign::CertifiedKey;
use crate::enums::ProtocolVersion;
use crate::error::Error;
use crate::key_log::{KeyLog, NoKeyLog};
use crate::msgs::persist::ClientSessionValue;
use crate::suites::CipherSuitePreference;
use crate::time_provider::{DefaultTimeProvider, TimeProvider};
use crate::verify::RootCertStore;

/// A trait for the ability to store client session data, so that
/// sessions can be resumed in future connections.
///
/// Values contain the master secret of the session and should be
/// treated as **highly sensitive data**.
///
/// `put` and `remove` are mutating; this isn't expressed in the type
/// system to allow implementations freedom in how to achieve interior
/// mutability.  `Mutex` is a common choice.
pub trait ClientSessionCache: Debug + Send + Sync {
    /// Remember `value` for `server_name`, replacing any earlier one.
    fn put(&self, server_name: &str, value: ClientSessionValue);

    /// The most recent value passed to `put` for `server_name`.
    fn get(&self, server_name: &str) -> Option<ClientSessionValue>;

    /// Forget any session for `server_name`.
    fn remove(&self, server_name: &str);
}

/// Common configuration for (typically) all connections made by a
/// program.
///
/// Making one of these is cheap, though one of the inputs may be
/// expensive: gathering trust roots from the filesystem.  Share it
/// between connections with an `Arc`.
#[derive(Clone)]
pub struct ClientConfig {
    /// Trust anchors for the server's certificate chain.
    pub roots: Arc<RootCertStore>,

    /// Sent when the server asks for a client certificate.  Without it
    /// an empty Certificate message is sent.
    pub client_auth_cert: Option<Arc<CertifiedKey>>,

    /// Lowest version accepted from the server.  The default is TLS 1.0.
    pub min_version: ProtocolVersion,

    /// Version offered in the ClientHello.  The default is TLS 1.2.
    pub max_version: ProtocolVersion,

    /// Suites offered, in order.
    pub cipher_suites: Arc<CipherSuitePreference>,

    /// Where sessions are kept between connections.  Sessions are keyed
    /// by `server_name`; without a name nothing is resumed.
    pub session_cache: Arc<dyn ClientSessionCache>,

    /// Sent as SNI unless it is an IP address, and checked against the
    /// server's certificate.
    pub server_name: Option<String>,

    /// Protocols offered, most preferred first.  Empty means no ALPN.
    pub alpn_protocols: Vec<Vec<u8>>,

    /// Offer `alpn_protocols` through NPN instead of ALPN.
    pub enable_npn: bool,

    /// Whether to send the session_ticket extension.  The default is
    /// true.
    pub enable_tickets: bool,

    /// Ask the server to staple an OCSP response.
    pub request_ocsp: bool,

    /// Accept any server certificate chain.  Signatures made with the
    /// server key are still checked.
    pub insecure_skip_verify: bool,

    /// How to output key material for debugging.  The default
    /// does nothing.
    pub key_log: Arc<dyn KeyLog>,

    /// Provides the current time for certificate validation.
    pub time_provider: Arc<dyn TimeProvider>,
}

impl ClientConfig {
    /// A configuration trusting `roots` with every other setting at its
    /// default.
    pub fn new(roots: Arc<RootCertStore>) -> Self {
        Self {
            roots,
            client_auth_cert: None,
            min_version: ProtocolVersion::TLSv1_0,
            max_version: ProtocolVersion::TLSv1_2,
            cipher_suites: Arc::new(CipherSuitePreference::default()),
            session_cache: Arc::new(NoClientSessionStorage {}),
            server_name: None,
            alpn_protocols: Vec::new(),
            enable_npn: false,
            enable_tickets: true,
            request_ocsp: false,
            insecure_skip_verify: false,
            key_log: Arc::new(NoKeyLog {}),
            time_provider: Arc::new(DefaultTimeProvider),
        }
    }

    pub(crate) fn current_time(&self) -> Result<UnixTime, Error> {
        self.time_provider
            .current_time()
            .ok_or(Error::FailedToGetCurrentTime)
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_name", &self.server_name)
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .field("alpn_protocols", &self.alpn_protocols)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish_non_exhaustive()
    }
}
