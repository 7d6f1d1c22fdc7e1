use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;

use pki_types::UnixTime;

use super::handy::{NeverProducesTickets, NoServerSessionStorage};
use crate::crl::CrlPool;
use crate::crypto::sign::CertifiedKey;
use crate::enums::{CipherSuite, ProtocolVersion};
use crate::error::Error;
use crate::grade::Grade;
use crate::ja3::Ja3;
use crate::key_log::{KeyLog, NoKeyLog};
use crate::suites::CipherSuitePreference;
use crate::time_provider::{DefaultTimeProvider, TimeProvider};
use crate::verify::RootCertStore;

/// A trait for the ability to store server session data.
///
/// The keys and values are opaque.
///
/// Both the keys and values should be treated as
/// **highly sensitive data**, containing enough key material
/// to break all security of the corresponding sessions.
///
/// `put` is a mutating operation; this isn't expressed
/// in the type system to allow implementations freedom in
/// how to achieve interior mutability.  `Mutex` is a common
/// choice.
pub trait StoresServerSessions: Debug + Send + Sync {
    /// Store session secrets encoded in `value` against `key`,
    /// overwrites any existing value against `key`.  Returns `true`
    /// if the value was stored.
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool;

    /// Find a value with the given `key`.  Return it, or None
    /// if it doesn't exist.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether the store can cache another session.  When false the
    /// server sends an empty session id.
    fn can_cache(&self) -> bool;
}

/// A trait for the ability to encrypt and decrypt tickets.
pub trait ProducesTickets: Debug + Send + Sync {
    /// Returns true if this implementation will encrypt/decrypt
    /// tickets.  Should return false if this is a dummy
    /// implementation: the server will not send the SessionTicket
    /// extension and will not call the other functions.
    fn enabled(&self) -> bool;

    /// Returns the lifetime in seconds of tickets produced now.
    /// The lifetime is provided as a hint to clients that the
    /// ticket will not be useful after the given time.
    fn lifetime(&self) -> u32;

    /// Encrypt and authenticate `plain`, returning the resulting
    /// ticket.  Return None if `plain` cannot be encrypted for
    /// some reason: an empty ticket will be sent and the connection
    /// will continue.
    fn encrypt(&self, plain: &[u8]) -> Option<Vec<u8>>;

    /// Decrypt `cipher`, validating its authenticity protection
    /// and recovering the plaintext.  `cipher` is fully attacker
    /// controlled, so this decryption must be side-channel free,
    /// panic-proof, and otherwise bullet-proof.  If the decryption
    /// fails, return None.
    fn decrypt(&self, cipher: &[u8]) -> Option<Vec<u8>>;
}

/// What the proxy knows about an incoming handshake when it is asked
/// for a rule or a certificate.
#[derive(Debug)]
pub struct ClientHelloInfo<'a> {
    /// The SNI, lowercased.
    pub server_name: Option<&'a str>,
    /// Suites offered, in client order.
    pub cipher_suites: &'a [CipherSuite],
    /// The version the client asked for, before clamping.
    pub version: ProtocolVersion,
    /// ALPN protocols offered, in client order.
    pub alpn: Vec<&'a [u8]>,
    /// The fingerprint of this hello.
    pub ja3: &'a Ja3,
    /// The address the connection was accepted on.
    pub vip: Option<IpAddr>,
}

/// How the server treats client certificates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAuthType {
    /// No CertificateRequest is sent.
    NoClientCert,
    /// Ask for a certificate; accept whatever comes, unverified.
    RequestClientCert,
    /// Require a certificate, unverified.
    RequireAnyClientCert,
    /// Ask for a certificate and verify it if one is sent.
    VerifyClientCertIfGiven,
    /// Require a certificate and verify it.
    RequireAndVerifyClientCert,
}

impl ClientAuthType {
    pub(crate) fn requested(self) -> bool {
        self != Self::NoClientCert
    }

    pub(crate) fn mandatory(self) -> bool {
        matches!(
            self,
            Self::RequireAnyClientCert | Self::RequireAndVerifyClientCert
        )
    }

    pub(crate) fn verifies(self) -> bool {
        matches!(
            self,
            Self::VerifyClientCertIfGiven | Self::RequireAndVerifyClientCert
        )
    }
}

/// Per-connection settings chosen by the proxy, typically from the
/// cluster the SNI or VIP maps to.
#[derive(Clone, Debug)]
pub struct Rule {
    /// Security grade for this connection.
    pub grade: Grade,
    /// Client authentication for this connection.
    pub client_auth: ClientAuthType,
    /// Overrides `ServerConfig::client_cas` when set.
    pub client_cas: Option<Arc<RootCertStore>>,
    /// Whether ChaCha20-Poly1305 suites may be chosen.
    pub chacha20: bool,
    /// Whether application data starts in small records.
    pub dynamic_record: bool,
    /// ALPN/NPN protocols, most preferred first.  Empty means use
    /// `ServerConfig::alpn_protocols`.
    pub next_protos: Vec<Vec<u8>>,
}

/// Chooses the `Rule` for one connection.
pub trait ServerRule: Send + Sync {
    /// Return `None` to use the defaults from `ServerConfig`.
    fn rule(&self, hello: &ClientHelloInfo<'_>) -> Option<Rule>;
}

/// Chooses among many certificates, before the built-in SNI matching.
pub trait MultiCertificate: Send + Sync {
    /// Return `None` to fall back to SNI matching over
    /// `ServerConfig::certificates`.
    fn certificate(&self, hello: &ClientHelloInfo<'_>) -> Option<Arc<CertifiedKey>>;
}

/// Loads a certificate and key by name.
pub trait KeyPairLoader: Send + Sync {
    /// Returns the certificate and key called `name`.
    fn load(&self, name: &str) -> Result<Arc<CertifiedKey>, Error>;
}

/// Common configuration for a set of server sessions.
///
/// Making one of these is cheap, though one of the inputs may be
/// expensive: gathering trust roots and certificates.  Share it
/// between connections with an `Arc`.
#[derive(Clone)]
pub struct ServerConfig {
    /// Certificates to choose from.  The first is the default when no
    /// SNI matches.
    pub certificates: Vec<Arc<CertifiedKey>>,

    /// Client authentication when the rule does not say otherwise.
    pub client_auth: ClientAuthType,

    /// Roots for verifying client certificates.  Their subjects are
    /// sent in CertificateRequest.
    pub client_cas: Arc<RootCertStore>,

    /// Consulted for every verified client certificate.
    pub crl_pool: Option<Arc<dyn CrlPool>>,

    /// Lowest version accepted.  The default is SSLv3.
    pub min_version: ProtocolVersion,

    /// Highest version negotiated.  The default is TLS 1.2.
    pub max_version: ProtocolVersion,

    /// Our cipher suites, most preferred first.
    pub cipher_suites: Arc<CipherSuitePreference>,

    /// Choose from our list rather than the client's.  The default is
    /// true.
    pub prefer_server_cipher_suites: bool,

    /// Per-connection rule hook.
    pub rule: Option<Arc<dyn ServerRule>>,

    /// How to store sessions for session-id resumption.
    pub session_storage: Arc<dyn StoresServerSessions>,

    /// How to produce tickets.
    pub ticketer: Arc<dyn ProducesTickets>,

    /// Certificate selection hook, asked before SNI matching.
    pub multi_certificate: Option<Arc<dyn MultiCertificate>>,

    /// Protocol names we support, most preferred first.
    /// If empty we don't do ALPN at all.
    pub alpn_protocols: Vec<Vec<u8>>,

    /// Grade when no rule applies.
    pub grade: Grade,

    /// Whether ChaCha20-Poly1305 suites may be chosen when no rule
    /// applies.
    pub chacha20: bool,

    /// Whether application data starts in small records when no rule
    /// applies.
    pub dynamic_record: bool,

    /// Accept a ClientHello framed as SSLv2.
    pub accept_sslv2_hello: bool,

    /// Force RC4 for SSLv3 under grade C.
    pub ssl3_poodle_defence: bool,

    /// How to output key material for debugging.  The default
    /// does nothing.
    pub key_log: Arc<dyn KeyLog>,

    /// Provides the current system time
    pub time_provider: Arc<dyn TimeProvider>,
}

impl ServerConfig {
    /// A configuration serving `certificates` with every other setting
    /// at its default.
    pub fn new(certificates: Vec<Arc<CertifiedKey>>) -> Self {
        Self {
            certificates,
            client_auth: ClientAuthType::NoClientCert,
            client_cas: Arc::new(RootCertStore::empty()),
            crl_pool: None,
            min_version: ProtocolVersion::SSLv3,
            max_version: ProtocolVersion::TLSv1_2,
            cipher_suites: Arc::new(CipherSuitePreference::default()),
            prefer_server_cipher_suites: true,
            rule: None,
            session_storage: Arc::new(NoServerSessionStorage {}),
            ticketer: Arc::new(NeverProducesTickets {}),
            multi_certificate: None,
            alpn_protocols: Vec::new(),
            grade: Grade::default(),
            chacha20: true,
            dynamic_record: true,
            accept_sslv2_hello: false,
            ssl3_poodle_defence: true,
            key_log: Arc::new(NoKeyLog {}),
            time_provider: Arc::new(DefaultTimeProvider),
        }
    }

    /// Loads each of `names` through `loader` into `certificates`.
    pub fn load_certificates(&mut self, loader: &dyn KeyPairLoader, names: &[&str]) -> Result<(), Error> {
        for name in names {
            self.certificates.push(loader.load(name)?);
        }
        Ok(())
    }

    /// The rule used when the hook is absent or declines.
    pub(crate) fn default_rule(&self) -> Rule {
        Rule {
            grade: self.grade,
            client_auth: self.client_auth,
            client_cas: None,
            chacha20: self.chacha20,
            dynamic_record: self.dynamic_record,
            next_protos: Vec::new(),
        }
    }

    pub(crate) fn current_time(&self) -> Result<UnixTime, Error> {
        self.time_provider
            .current_time()
            .ok_or(Error::FailedToGetCurrentTime)
    }
}

impl Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("certificates", &self.certificates.len())
            .field("client_auth", &self.client_auth)
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .field("grade", &self.grade)
            .finish_non_exhaustive()
    }
}
