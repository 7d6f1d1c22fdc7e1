//! Hash functions for transcripts, PRFs, record MACs and signatures.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Hash functions used by the key schedule, record MACs and signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// MD5, for SSLv3 and TLS1.0/1.1 only.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// One-shot digest of `data`.
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        let mut ctx = self.start();
        ctx.update(data);
        ctx.finish()
    }

    /// Starts an incremental hash.
    pub fn start(self) -> Context {
        match self {
            Self::Md5 => Context::Md5(Md5::new()),
            Self::Sha1 => Context::Sha1(Sha1::new()),
            Self::Sha256 => Context::Sha256(Sha256::new()),
            Self::Sha384 => Context::Sha384(Sha384::new()),
            Self::Sha512 => Context::Sha512(Sha512::new()),
        }
    }
}

/// A running hash.  `fork_finish` lets the transcript produce
/// intermediate values without disturbing the running state.
#[derive(Clone)]
pub enum Context {
    /// Running MD5.
    Md5(Md5),
    /// Running SHA-1.
    Sha1(Sha1),
    /// Running SHA-256.
    Sha256(Sha256),
    /// Running SHA-384.
    Sha384(Sha384),
    /// Running SHA-512.
    Sha512(Sha512),
}

impl Context {
    /// Adds `data` to the hash.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    /// The digest so far, leaving `self` usable.
    pub fn fork_finish(&self) -> Vec<u8> {
        self.clone().finish()
    }

    /// The final digest.
    pub fn finish(self) -> Vec<u8> {
        match self {
            Self::Md5(h) => h.finalize().to_vec(),
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}
