use core::fmt;
use core::ops::BitOr;

use crate::crypto::cipher::BulkAlgorithm;
use crate::crypto::hash::HashAlgorithm;
use crate::enums::{CipherSuite, ProtocolVersion};
use crate::error::Error;

/// Properties of a cipher suite that negotiation filters on.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SuiteFlags(u8);

impl SuiteFlags {
    /// No flags: RSA key exchange, any version.
    pub const NONE: Self = Self(0);
    /// Ephemeral elliptic-curve Diffie-Hellman key exchange.
    pub const ECDHE: Self = Self(1 << 0);
    /// Server authenticates with an ECDSA certificate.
    pub const ECDSA: Self = Self(1 << 1);
    /// Only usable from TLS 1.2.
    pub const TLS12: Self = Self(1 << 2);
    /// The TLS 1.2 PRF and transcript hash are SHA-384.
    pub const SHA384: Self = Self(1 << 3);
    /// RC4 bulk encryption, subject to the grade's RC4 policy.
    pub const RC4: Self = Self(1 << 4);
    /// ChaCha20-Poly1305, which a rule may switch off.
    pub const CHACHA20: Self = Self(1 << 5);

    /// Both sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SuiteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for SuiteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ECDHE, "ECDHE"),
            (Self::ECDSA, "ECDSA"),
            (Self::TLS12, "TLS12"),
            (Self::SHA384, "SHA384"),
            (Self::RC4, "RC4"),
            (Self::CHACHA20, "CHACHA20"),
        ];
        f.debug_set()
            .entries(
                names
                    .iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .map(|(_, name)| name),
            )
            .finish()
    }
}

/// A cipher suite this crate implements.
///
/// All of them are listed in [`ALL_CIPHER_SUITES`].
#[derive(PartialEq)]
pub struct SupportedCipherSuite {
    /// The IANA identifier.
    pub suite: CipherSuite,
    /// Record encryption.
    pub bulk: BulkAlgorithm,
    /// The record MAC hash.  `None` for AEAD suites.
    pub mac: Option<HashAlgorithm>,
    /// Negotiation properties.
    pub flags: SuiteFlags,
}

impl fmt::Debug for SupportedCipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.suite, f)
    }
}

impl SupportedCipherSuite {
    /// Key exchange is ECDHE rather than RSA.
    pub fn is_ecdhe(&self) -> bool {
        self.flags.contains(SuiteFlags::ECDHE)
    }

    /// The server must hold an ECDSA certificate.
    pub fn is_ecdsa(&self) -> bool {
        self.flags.contains(SuiteFlags::ECDSA)
    }

    /// Bulk encryption is RC4.
    pub fn is_rc4(&self) -> bool {
        self.flags.contains(SuiteFlags::RC4)
    }

    /// Bulk encryption is ChaCha20-Poly1305.
    pub fn is_chacha20(&self) -> bool {
        self.flags.contains(SuiteFlags::CHACHA20)
    }

    /// The suite may be negotiated at `version`.
    pub fn usable_for_version(&self, version: ProtocolVersion) -> bool {
        !self.flags.contains(SuiteFlags::TLS12) || version.at_least(ProtocolVersion::TLSv1_2)
    }

    /// The hash of the TLS 1.2 PRF and of the Finished/CertificateVerify
    /// transcript.
    pub(crate) fn prf_hash(&self) -> HashAlgorithm {
        match self.flags.contains(SuiteFlags::SHA384) {
            true => HashAlgorithm::Sha384,
            false => HashAlgorithm::Sha256,
        }
    }

    pub(crate) fn mac_len(&self) -> usize {
        self.mac
            .map(HashAlgorithm::output_len)
            .unwrap_or(0)
    }

    /// Bytes of key block: MAC secrets, keys and IVs for both sides.
    pub(crate) fn key_block_len(&self) -> usize {
        2 * (self.mac_len() + self.bulk.key_len() + self.bulk.iv_len())
    }
}

macro_rules! suite {
    ($name:ident, $bulk:ident, $mac:expr, $flags:expr) => {
        pub(crate) static $name: SupportedCipherSuite = SupportedCipherSuite {
            suite: CipherSuite::$name,
            bulk: BulkAlgorithm::$bulk,
            mac: $mac,
            flags: $flags,
        };
    };
}

const SHA1: Option<HashAlgorithm> = Some(HashAlgorithm::Sha1);
const SHA256: Option<HashAlgorithm> = Some(HashAlgorithm::Sha256);
const AEAD: Option<HashAlgorithm> = None;
const ECDHE: SuiteFlags = SuiteFlags::ECDHE;
const ECDHE_ECDSA: SuiteFlags = SuiteFlags::ECDHE.union(SuiteFlags::ECDSA);
const ECDHE_TLS12: SuiteFlags = ECDHE.union(SuiteFlags::TLS12);
const ECDHE_ECDSA_TLS12: SuiteFlags = ECDHE_ECDSA.union(SuiteFlags::TLS12);

suite!(
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ChaCha20Poly1305,
    AEAD,
    ECDHE_TLS12.union(SuiteFlags::CHACHA20)
);
suite!(
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    ChaCha20Poly1305,
    AEAD,
    ECDHE_ECDSA_TLS12.union(SuiteFlags::CHACHA20)
);
suite!(TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256, Aes128Gcm, AEAD, ECDHE_TLS12);
suite!(TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256, Aes128Gcm, AEAD, ECDHE_ECDSA_TLS12);
suite!(
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    Aes256Gcm,
    AEAD,
    ECDHE_TLS12.union(SuiteFlags::SHA384)
);
suite!(
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    Aes256Gcm,
    AEAD,
    ECDHE_ECDSA_TLS12.union(SuiteFlags::SHA384)
);
suite!(TLS_ECDHE_RSA_WITH_RC4_128_SHA, Rc4_128, SHA1, ECDHE.union(SuiteFlags::RC4));
suite!(TLS_ECDHE_ECDSA_WITH_RC4_128_SHA, Rc4_128, SHA1, ECDHE_ECDSA.union(SuiteFlags::RC4));
suite!(TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA, Aes128Cbc, SHA1, ECDHE);
suite!(TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA, Aes128Cbc, SHA1, ECDHE_ECDSA);
suite!(TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA, Aes256Cbc, SHA1, ECDHE);
suite!(TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA, Aes256Cbc, SHA1, ECDHE_ECDSA);
suite!(TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256, Aes128Cbc, SHA256, ECDHE_TLS12);
suite!(TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256, Aes128Cbc, SHA256, ECDHE_ECDSA_TLS12);
suite!(TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA, TripleDesCbc, SHA1, ECDHE);
suite!(TLS_RSA_WITH_RC4_128_SHA, Rc4_128, SHA1, SuiteFlags::RC4);
suite!(
    TLS_RSA_WITH_RC4_128_MD5,
    Rc4_128,
    Some(HashAlgorithm::Md5),
    SuiteFlags::RC4
);
suite!(TLS_RSA_WITH_AES_128_GCM_SHA256, Aes128Gcm, AEAD, SuiteFlags::TLS12);
suite!(
    TLS_RSA_WITH_AES_256_GCM_SHA384,
    Aes256Gcm,
    AEAD,
    SuiteFlags::TLS12.union(SuiteFlags::SHA384)
);
suite!(TLS_RSA_WITH_AES_128_CBC_SHA, Aes128Cbc, SHA1, SuiteFlags::NONE);
suite!(TLS_RSA_WITH_AES_256_CBC_SHA, Aes256Cbc, SHA1, SuiteFlags::NONE);
suite!(TLS_RSA_WITH_AES_128_CBC_SHA256, Aes128Cbc, SHA256, SuiteFlags::TLS12);
suite!(TLS_RSA_WITH_3DES_EDE_CBC_SHA, TripleDesCbc, SHA1, SuiteFlags::NONE);

/// Every supported suite, in default preference order.
pub static ALL_CIPHER_SUITES: &[&SupportedCipherSuite] = &[
    &TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    &TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    &TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    &TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    &TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    &TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    &TLS_ECDHE_RSA_WITH_RC4_128_SHA,
    &TLS_ECDHE_ECDSA_WITH_RC4_128_SHA,
    &TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
    &TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA,
    &TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
    &TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA,
    &TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256,
    &TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256,
    &TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA,
    &TLS_RSA_WITH_RC4_128_SHA,
    &TLS_RSA_WITH_RC4_128_MD5,
    &TLS_RSA_WITH_AES_128_GCM_SHA256,
    &TLS_RSA_WITH_AES_256_GCM_SHA384,
    &TLS_RSA_WITH_AES_128_CBC_SHA,
    &TLS_RSA_WITH_AES_256_CBC_SHA,
    &TLS_RSA_WITH_AES_128_CBC_SHA256,
    &TLS_RSA_WITH_3DES_EDE_CBC_SHA,
];

/// Looks up a suite by its IANA identifier.
pub fn find_suite(suite: CipherSuite) -> Option<&'static SupportedCipherSuite> {
    ALL_CIPHER_SUITES
        .iter()
        .find(|s| s.suite == suite)
        .copied()
}

/// How RC4 suites are treated for one handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rc4Policy {
    /// RC4 suites are never chosen.
    Disable,
    /// RC4 suites compete like any other.
    Enable,
    /// Only RC4 suites are chosen.
    Only,
}

/// Everything about the connection that decides whether a suite can be
/// used, apart from the two suite lists.
#[derive(Clone, Copy, Debug)]
pub struct SuiteConstraints {
    /// The negotiated version.
    pub version: ProtocolVersion,
    /// The client can do ECDHE with a group we support.
    pub elliptic_ok: bool,
    /// The selected certificate has an ECDSA key.
    pub ecdsa_ok: bool,
    /// ChaCha20-Poly1305 suites are allowed.
    pub chacha_ok: bool,
    /// How RC4 suites are treated.
    pub rc4: Rc4Policy,
}

/// Returns the suite `id` if the peer listed it and it is usable under
/// `constraints`.
pub fn try_cipher_suite(
    id: CipherSuite,
    peer_list: &[CipherSuite],
    constraints: &SuiteConstraints,
) -> Option<&'static SupportedCipherSuite> {
    if !peer_list.contains(&id) {
        return None;
    }

    let suite = find_suite(id)?;
    let usable = (!suite.is_ecdhe() || constraints.elliptic_ok)
        && suite.is_ecdsa() == constraints.ecdsa_ok
        && suite.usable_for_version(constraints.version)
        && (!suite.is_chacha20() || constraints.chacha_ok)
        && match constraints.rc4 {
            Rc4Policy::Disable => !suite.is_rc4(),
            Rc4Policy::Enable => true,
            Rc4Policy::Only => suite.is_rc4(),
        };

    usable.then_some(suite)
}

/// An ordered list of suites, optionally with priorities that make
/// groups of suites equally preferred.
///
/// Built once and shared by `Arc` between configurations.
#[derive(Clone, Debug)]
pub struct CipherSuitePreference {
    suites: Vec<&'static SupportedCipherSuite>,
    priorities: Option<Vec<u32>>,
}

impl CipherSuitePreference {
    /// `priorities`, when given, assigns one value per suite; suites
    /// sharing a value are picked in the client's order.
    pub fn new(suites: &[CipherSuite], priorities: Option<Vec<u32>>) -> Result<Self, Error> {
        if suites.is_empty() {
            return Err(Error::InvalidConfig("no cipher suites configured".into()));
        }

        let suites = suites
            .iter()
            .map(|id| {
                find_suite(*id)
                    .ok_or_else(|| Error::InvalidConfig(format!("unsupported cipher suite {:?}", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(priorities) = &priorities {
            if priorities.len() != suites.len() {
                return Err(Error::InvalidConfig(format!(
                    "{} cipher suite priorities given for {} suites",
                    priorities.len(),
                    suites.len()
                )));
            }
        }

        Ok(Self { suites, priorities })
    }

    /// The suites, in configured order.
    pub fn suites(&self) -> &[&'static SupportedCipherSuite] {
        &self.suites
    }

    pub(crate) fn ids(&self) -> Vec<CipherSuite> {
        self.suites
            .iter()
            .map(|s| s.suite)
            .collect()
    }

    /// Picks a suite from those the client offered.
    pub fn choose(
        &self,
        client: &[CipherSuite],
        constraints: &SuiteConstraints,
        prefer_server: bool,
    ) -> Option<&'static SupportedCipherSuite> {
        if !prefer_server {
            let ours = self.ids();
            return client
                .iter()
                .find_map(|id| try_cipher_suite(*id, &ours, constraints));
        }

        let priorities = match &self.priorities {
            Some(priorities) => priorities,
            None => {
                return self
                    .suites
                    .iter()
                    .find_map(|s| try_cipher_suite(s.suite, client, constraints));
            }
        };

        let mut visited = Vec::new();
        for priority in priorities {
            if visited.contains(priority) {
                continue;
            }
            visited.push(*priority);

            let class: Vec<CipherSuite> = self
                .suites
                .iter()
                .zip(priorities)
                .filter(|(_, p)| *p == priority)
                .map(|(s, _)| s.suite)
                .collect();

            let chosen = client
                .iter()
                .filter(|id| class.contains(*id))
                .find_map(|id| try_cipher_suite(*id, client, constraints));
            if chosen.is_some() {
                return chosen;
            }
        }

        None
    }
}

impl Default for CipherSuitePreference {
    fn default() -> Self {
        Self {
            suites: ALL_CIPHER_SUITES.to_vec(),
            priorities: None,
        }
    }
}
