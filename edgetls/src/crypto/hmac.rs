use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use super::hash::HashAlgorithm;

/// A keyed HMAC instance.  Cloning it is cheaper than rekeying, so the
/// record layer keys once per cipher spec and clones per record.
#[derive(Clone)]
pub(crate) enum Key {
    Md5(Hmac<Md5>),
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

fn keyed<M: Mac + hmac::digest::KeyInit>(key: &[u8]) -> M {
    match <M as Mac>::new_from_slice(key) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => unreachable!(),
    }
}

impl Key {
    pub(crate) fn new(alg: HashAlgorithm, key: &[u8]) -> Self {
        match alg {
            HashAlgorithm::Md5 => Self::Md5(keyed(key)),
            HashAlgorithm::Sha1 => Self::Sha1(keyed(key)),
            HashAlgorithm::Sha256 => Self::Sha256(keyed(key)),
            HashAlgorithm::Sha384 => Self::Sha384(keyed(key)),
            HashAlgorithm::Sha512 => Self::Sha512(keyed(key)),
        }
    }

    /// Computes the tag over the concatenation of `data`.
    pub(crate) fn sign(&self, data: &[&[u8]]) -> Vec<u8> {
        fn run<M: Mac + Clone>(mac: &M, data: &[&[u8]]) -> Vec<u8> {
            let mut mac = mac.clone();
            for d in data {
                mac.update(d);
            }
            mac.finalize().into_bytes().to_vec()
        }

        match self {
            Self::Md5(m) => run(m, data),
            Self::Sha1(m) => run(m, data),
            Self::Sha256(m) => run(m, data),
            Self::Sha384(m) => run(m, data),
            Self::Sha512(m) => run(m, data),
        }
    }

    pub(crate) fn tag_len(&self) -> usize {
        match self {
            Self::Md5(_) => 16,
            Self::Sha1(_) => 20,
            Self::Sha256(_) => 32,
            Self::Sha384(_) => 48,
            Self::Sha512(_) => 64,
        }
    }
}
