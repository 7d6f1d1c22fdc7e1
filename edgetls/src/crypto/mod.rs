//! Cryptographic building blocks for the handshake and record layer.
//!
//! Primitives come from the RustCrypto crates; this module only adapts
//! them to the shapes TLS needs: transcript hashes, the version-specific
//! PRFs, record ciphers and MACs, key exchange and handshake signatures.

pub mod cipher;
pub mod hash;
pub(crate) mod hmac;
pub(crate) mod kx;
pub(crate) mod prf;
pub mod sign;
pub(crate) mod verify;
