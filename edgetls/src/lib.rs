//! # edgetls - SSLv3 to TLS 1.2 for edge proxies
//!
//! edgetls terminates and originates TLS on behalf of a reverse proxy.
//! It speaks every version from SSLv3 to TLS 1.2, including the
//! legacy suites (RC4, 3DES, CBC with SHA-1) that old clients still
//! need, and gates them behind a per-listener security [`Grade`].
//!
//! ## Features
//!
//! * SSLv3, TLS1.0, TLS1.1 and TLS1.2, with the SSLv2-compatible
//!   ClientHello accepted on request.
//! * RSA and ECDHE (x25519, secp256r1, secp384r1) key exchange; RSA and
//!   ECDSA certificates.
//! * AES-GCM, ChaCha20-Poly1305, AES-CBC, 3DES-CBC and RC4 bulk
//!   encryption.
//! * Server cipher-suite preference with equal-priority groups, so the
//!   server can defer to the client within a group.
//! * Session resumption by session id and by ticket
//!   ([RFC5077](https://tools.ietf.org/html/rfc5077)), with rotating
//!   ticket keys.
//! * SNI with wildcard certificate selection, ALPN and NPN.
//! * OCSP stapling with a freshness check.
//! * Client authentication, with CRL revocation checks.
//! * JA3 fingerprints of every ClientHello.
//! * Dynamic record sizing for faster time-to-first-byte.
//! * Secure renegotiation signalling; renegotiation itself is refused.
//!
//! ## Non-features
//!
//! * TLS1.3.
//! * Renegotiation.
//! * Compression.
//!
//! ## Usage
//!
//! A [`Conn`] wraps a blocking [`Transport`], normally a
//! [`std::net::TcpStream`].  Build a [`ServerConfig`] or
//! [`ClientConfig`] once, share it in an `Arc`, and make one `Conn`
//! per accepted or dialled socket:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::io::{Read, Write};
//! use std::net::TcpListener;
//! use std::sync::Arc;
//!
//! use edgetls::{CertifiedKey, Conn, ServerConfig};
//!
//! let key = CertifiedKey::from_pem_files("end.fullchain", "end.key")?;
//! let config = Arc::new(ServerConfig::new(vec![Arc::new(key)]));
//!
//! let listener = TcpListener::bind("0.0.0.0:8443")?;
//! let (sock, _) = listener.accept()?;
//! let mut conn = Conn::server(sock, config);
//! conn.handshake()?;
//!
//! let mut buf = [0u8; 1024];
//! let n = conn.read(&mut buf)?;
//! conn.write_all(&buf[..n])?;
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate features
//!
//! - `logging`: this makes the edgetls crate depend on the `log` crate.
//!   edgetls outputs interesting protocol-level messages at `trace!` and
//!   `debug!` level, and protocol-level errors at `warn!` and `error!`
//!   level.  The log messages do not contain secret key data, and so are
//!   safe to archive without affecting session security.  This feature
//!   is in the default set.

// Require docs for public APIs, deny unsafe code, etc.
#![forbid(unsafe_code, unused_must_use)]
#![deny(
    clippy::use_self,
    unused_import_braces,
    unused_extern_crates
)]
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
// Relax these clippy lints:
// - too_many_arguments: some things just need a lot of state, wrapping it
//   doesn't necessarily make it easier to follow what's going on
// - new_ret_no_self: we sometimes return `Arc<Self>`, which seems fine
// - single_component_path_imports: our top-level `use log` import causes
//   a false positive, https://github.com/rust-lang/rust-clippy/issues/5210
// - new_without_default: for internal constructors, the indirection is not
//   helpful
#![allow(
    clippy::too_many_arguments,
    clippy::new_ret_no_self,
    clippy::single_component_path_imports,
    clippy::new_without_default
)]

// log for logging (optional).
#[cfg(feature = "logging")]
use log;

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace    ( ($($tt:tt)*) => {{}} );
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! warn     ( ($($tt:tt)*) => {{}} );
    macro_rules! error    ( ($($tt:tt)*) => {{}} );
    #[allow(unused_imports)]
    pub(crate) use {debug, error, trace, warn};
}

#[macro_use]
mod msgs;
#[macro_use]
mod check;
mod common_state;
mod conn;
mod crl;
pub mod crypto;
mod enums;
mod error;
mod grade;
mod hash_hs;
mod ja3;
mod key_log;
mod key_schedule;
mod limited_cache;
mod ocsp;
mod rand;
mod record;
mod suites;
mod ticketer;
mod time_provider;
mod verify;

/// Internal classes which may be useful outside the library.
/// The contents of this section DO NOT form part of the stable interface.
#[doc(hidden)]
pub mod internal {
    /// Low-level TLS message parsing and encoding functions.
    pub mod msgs {
        pub use crate::msgs::*;
    }
}

// The public interface is:
pub use crate::common_state::{ConnectionState, Side};
pub use crate::conn::{Conn, Transport};
pub use crate::crl::{CrlPool, MemoryCrlPool};
pub use crate::crypto::cipher::BulkAlgorithm;
pub use crate::crypto::hash::HashAlgorithm;
pub use crate::crypto::sign::{CertifiedKey, SigningKey};
pub use crate::enums::{
    AlertDescription, CipherSuite, ContentType, HandshakeType, ProtocolVersion, SignatureScheme,
};
pub use crate::error::{CertificateError, Error, InvalidMessage, PeerIncompatible, PeerMisbehaved};
pub use crate::grade::Grade;
pub use crate::ja3::Ja3;
pub use crate::key_log::{KeyLog, KeyLogFile, NoKeyLog};
pub use crate::msgs::persist::{ClientSessionValue, SessionState};
pub use crate::rand::GetRandomFailed;
pub use crate::suites::{
    find_suite, try_cipher_suite, CipherSuitePreference, Rc4Policy, SuiteConstraints, SuiteFlags,
    SupportedCipherSuite, ALL_CIPHER_SUITES,
};
pub use crate::ticketer::Ticketer;
pub use crate::time_provider::{DefaultTimeProvider, FixedTimeProvider, TimeProvider};
pub use crate::verify::RootCertStore;

/// Items for use in a client.
pub mod client;
pub use client::{ClientConfig, ClientSessionCache};

/// Items for use in a server.
pub mod server;
pub use server::{ServerConfig, StoresServerSessions};
