//! Server and client private keys, and the certificates they prove.

use std::fmt;
use std::path::Path;

use der::oid::AssociatedOid;
use der::Decode;
use pki_types::pem::PemObject;
use pki_types::{CertificateDer, PrivateKeyDer};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use signature::hazmat::PrehashSigner;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::Certificate;

use super::hash::HashAlgorithm;
use crate::enums::SignatureScheme;
use crate::error::Error;

/// The hash a TLS 1.2 signature scheme signs over.
pub(crate) fn scheme_hash(scheme: SignatureScheme) -> Option<HashAlgorithm> {
    match scheme {
        SignatureScheme::RSA_PKCS1_SHA1 | SignatureScheme::ECDSA_SHA1_Legacy => {
            Some(HashAlgorithm::Sha1)
        }
        SignatureScheme::RSA_PKCS1_SHA256 | SignatureScheme::ECDSA_NISTP256_SHA256 => {
            Some(HashAlgorithm::Sha256)
        }
        SignatureScheme::RSA_PKCS1_SHA384 | SignatureScheme::ECDSA_NISTP384_SHA384 => {
            Some(HashAlgorithm::Sha384)
        }
        SignatureScheme::RSA_PKCS1_SHA512 | SignatureScheme::ECDSA_NISTP521_SHA512 => {
            Some(HashAlgorithm::Sha512)
        }
        _ => None,
    }
}

/// `MD5(message) || SHA1(message)`, what RSA signs before TLS 1.2.
pub(crate) fn legacy_digest(message: &[u8]) -> Vec<u8> {
    let mut out = HashAlgorithm::Md5.hash(message);
    out.extend(HashAlgorithm::Sha1.hash(message));
    out
}

pub(crate) fn rsa_padding(alg: HashAlgorithm) -> Pkcs1v15Sign {
    match alg {
        HashAlgorithm::Md5 => Pkcs1v15Sign::new_unprefixed(),
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

/// A private key able to sign handshake messages.
pub enum SigningKey {
    /// An RSA key, signing with PKCS#1 v1.5.
    Rsa(Box<RsaPrivateKey>),
    /// An ECDSA key on secp256r1.
    EcdsaP256(p256::ecdsa::SigningKey),
    /// An ECDSA key on secp384r1.
    EcdsaP384(p384::ecdsa::SigningKey),
}

impl SigningKey {
    /// Loads a PKCS#8, PKCS#1 (RSA) or SEC1 (EC) private key.
    pub fn from_der(key: &PrivateKeyDer<'_>) -> Result<Self, Error> {
        let unsupported = || Error::General("unsupported private key".into());
        match key {
            PrivateKeyDer::Pkcs8(der) => {
                let der = der.secret_pkcs8_der();
                if let Ok(rsa) = RsaPrivateKey::from_pkcs8_der(der) {
                    return Ok(Self::Rsa(Box::new(rsa)));
                }
                if let Ok(p256) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
                    return Ok(Self::EcdsaP256(p256));
                }
                p384::ecdsa::SigningKey::from_pkcs8_der(der)
                    .map(Self::EcdsaP384)
                    .map_err(|_| unsupported())
            }
            PrivateKeyDer::Pkcs1(der) => RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der())
                .map(|rsa| Self::Rsa(Box::new(rsa)))
                .map_err(|_| unsupported()),
            PrivateKeyDer::Sec1(der) => {
                let der = der.secret_sec1_der();
                if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
                    return Ok(Self::EcdsaP256(secret.into()));
                }
                p384::SecretKey::from_sec1_der(der)
                    .map(|secret| Self::EcdsaP384(secret.into()))
                    .map_err(|_| unsupported())
            }
            _ => Err(unsupported()),
        }
    }

    /// The key signs with ECDSA, so only ECDHE_ECDSA suites can use it.
    pub fn is_ecdsa(&self) -> bool {
        !matches!(self, Self::Rsa(_))
    }

    fn preferred_schemes(&self) -> &'static [SignatureScheme] {
        match self {
            Self::Rsa(_) => &[
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::RSA_PKCS1_SHA1,
            ],
            Self::EcdsaP256(_) => &[
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ECDSA_SHA1_Legacy,
            ],
            Self::EcdsaP384(_) => &[
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ECDSA_NISTP256_SHA256,
            ],
        }
    }

    /// Picks a TLS 1.2 scheme the peer offered.  A peer that sent no
    /// signature_algorithms extension implies SHA-1 (RFC 5246, 7.4.1.4.1).
    pub(crate) fn choose_scheme(&self, offered: Option<&[SignatureScheme]>) -> Option<SignatureScheme> {
        let ours = self.preferred_schemes();
        match offered {
            Some(offered) => ours
                .iter()
                .find(|s| offered.contains(s))
                .copied(),
            None => ours
                .iter()
                .find(|s| scheme_hash(**s) == Some(HashAlgorithm::Sha1))
                .copied(),
        }
    }

    /// Signs `message`.  With a TLS 1.2 `scheme` its hash is used;
    /// without one the pre-1.2 rules apply.
    pub(crate) fn sign(&self, scheme: Option<SignatureScheme>, message: &[u8]) -> Result<Vec<u8>, Error> {
        match scheme {
            Some(scheme) => {
                let hash = scheme_hash(scheme)
                    .ok_or_else(|| Error::General(format!("cannot sign with {:?}", scheme)))?;
                self.sign_digest(hash, &hash.hash(message))
            }
            None => self.sign_legacy(&legacy_digest(message)),
        }
    }

    /// Signs a pre-1.2 `MD5 || SHA1` digest: RSA signs it whole without
    /// a DigestInfo prefix, ECDSA signs the SHA-1 half.
    pub(crate) fn sign_legacy(&self, md5_sha1: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            Self::Rsa(_) => self.sign_digest(HashAlgorithm::Md5, md5_sha1),
            _ => self.sign_digest(HashAlgorithm::Sha1, md5_sha1.get(16..).unwrap_or_default()),
        }
    }

    /// `alg` names the digest for the PKCS#1 prefix; `Md5` stands for
    /// the unprefixed legacy form.
    fn sign_digest(&self, alg: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>, Error> {
        let failed = |_| Error::General("signing failed".into());
        match self {
            Self::Rsa(key) => key
                .sign(rsa_padding(alg), digest)
                .map_err(|_| Error::General("signing failed".into())),
            Self::EcdsaP256(key) => {
                let sig: p256::ecdsa::Signature = key.sign_prehash(digest).map_err(failed)?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            Self::EcdsaP384(key) => {
                let sig: p384::ecdsa::Signature = key.sign_prehash(digest).map_err(failed)?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rsa(_) => "SigningKey::Rsa",
            Self::EcdsaP256(_) => "SigningKey::EcdsaP256",
            Self::EcdsaP384(_) => "SigningKey::EcdsaP384",
        })
    }
}

/// A certificate chain, its private key, and an optional stapled OCSP
/// response.
#[derive(Debug)]
pub struct CertifiedKey {
    /// The chain, end-entity first.
    pub cert: Vec<CertificateDer<'static>>,
    /// The private key matching the end-entity certificate.
    pub key: SigningKey,
    /// A DER OCSPResponse to staple when clients ask for one.
    pub ocsp: Option<Vec<u8>>,
    names: Vec<String>,
}

impl CertifiedKey {
    /// Pairs a chain, end-entity first, with its key.
    pub fn new(cert: Vec<CertificateDer<'static>>, key: SigningKey) -> Self {
        let names = cert
            .first()
            .map(|ee| dns_names(ee))
            .unwrap_or_default();
        Self {
            cert,
            key,
            ocsp: None,
            names,
        }
    }

    /// Reads a PEM certificate chain and a PEM private key.
    pub fn from_pem_files(cert_file: impl AsRef<Path>, key_file: impl AsRef<Path>) -> Result<Self, Error> {
        let cert = CertificateDer::pem_file_iter(cert_file)
            .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
            .map_err(|e| Error::General(format!("cannot read certificates: {}", e)))?;
        if cert.is_empty() {
            return Err(Error::General("no certificates found".into()));
        }

        let key = PrivateKeyDer::from_pem_file(key_file)
            .map_err(|e| Error::General(format!("cannot read private key: {}", e)))?;
        Ok(Self::new(cert, SigningKey::from_der(&key)?))
    }

    /// Attaches a DER OCSPResponse to staple.
    pub fn with_ocsp(mut self, ocsp: Vec<u8>) -> Self {
        self.ocsp = Some(ocsp);
        self
    }

    /// The leaf certificate, if the chain is not empty.
    pub fn end_entity_cert(&self) -> Option<&CertificateDer<'static>> {
        self.cert.first()
    }

    /// DNS names from the end-entity certificate, lowercased.
    pub fn dns_names(&self) -> &[String] {
        &self.names
    }
}

fn dns_names(cert: &CertificateDer<'_>) -> Vec<String> {
    let Ok(cert) = Certificate::from_der(cert.as_ref()) else {
        return Vec::new();
    };

    cert.tbs_certificate
        .extensions
        .iter()
        .flatten()
        .filter(|ext| ext.extn_id == SubjectAltName::OID)
        .filter_map(|ext| SubjectAltName::from_der(ext.extn_value.as_bytes()).ok())
        .flat_map(|san| san.0)
        .filter_map(|name| match name {
            GeneralName::DnsName(dns) => Some(dns.to_string().to_ascii_lowercase()),
            _ => None,
        })
        .collect()
}
