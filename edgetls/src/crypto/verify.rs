use der::{Decode, Encode, Reader};
use pki_types::{
    alg_id, AlgorithmIdentifier, CertificateDer, InvalidSignature, SignatureVerificationAlgorithm,
};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{pkcs1v15, BigUint, RsaPublicKey};
use signature::hazmat::PrehashVerifier;
use x509_cert::Certificate;

use super::hash::HashAlgorithm;
use super::sign::{legacy_digest, rsa_padding, scheme_hash};
use crate::enums::SignatureScheme;
use crate::error::{CertificateError, Error, PeerMisbehaved};

/// The public key from a peer's end-entity certificate, used to check
/// ServerKeyExchange and CertificateVerify signatures.
#[derive(Debug)]
pub(crate) enum PeerPublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
}

impl PeerPublicKey {
    pub(crate) fn from_cert(cert: &CertificateDer<'_>) -> Result<Self, Error> {
        let spki = Certificate::from_der(cert.as_ref())
            .and_then(|cert| cert.tbs_certificate.subject_public_key_info.to_der())
            .map_err(|_| CertificateError::BadEncoding)?;

        if let Ok(key) = RsaPublicKey::from_public_key_der(&spki) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(&spki) {
            return Ok(Self::EcdsaP256(key));
        }
        p384::ecdsa::VerifyingKey::from_public_key_der(&spki)
            .map(Self::EcdsaP384)
            .map_err(|_| CertificateError::UnsupportedKeyType.into())
    }

    pub(crate) fn is_ecdsa(&self) -> bool {
        !matches!(self, Self::Rsa(_))
    }

    /// Checks `sig` over `message`.  `scheme` is the TLS 1.2
    /// DigitallySigned algorithm; `None` means the pre-1.2 rules.
    pub(crate) fn verify(
        &self,
        scheme: Option<SignatureScheme>,
        message: &[u8],
        sig: &[u8],
    ) -> Result<(), Error> {
        let Some(scheme) = scheme else {
            return self.verify_legacy(&legacy_digest(message), sig);
        };

        let hash = match scheme_hash(scheme) {
            Some(hash) if scheme.is_ecdsa() == self.is_ecdsa() => hash,
            _ => return Err(PeerMisbehaved::SignedKxWithWrongAlgorithm.into()),
        };
        self.verify_digest(hash, &hash.hash(message), sig)
    }

    /// Checks a signature over a pre-1.2 `MD5 || SHA1` digest.
    pub(crate) fn verify_legacy(&self, md5_sha1: &[u8], sig: &[u8]) -> Result<(), Error> {
        match self {
            Self::Rsa(_) => self.verify_digest(HashAlgorithm::Md5, md5_sha1, sig),
            _ => self.verify_digest(
                HashAlgorithm::Sha1,
                md5_sha1.get(16..).unwrap_or_default(),
                sig,
            ),
        }
    }

    fn verify_digest(&self, alg: HashAlgorithm, digest: &[u8], sig: &[u8]) -> Result<(), Error> {
        let ok = match self {
            Self::Rsa(key) => key.verify(rsa_padding(alg), digest, sig).is_ok(),
            Self::EcdsaP256(key) => p256::ecdsa::Signature::from_der(sig)
                .and_then(|sig| key.verify_prehash(digest, &sig))
                .is_ok(),
            Self::EcdsaP384(key) => p384::ecdsa::Signature::from_der(sig)
                .and_then(|sig| key.verify_prehash(digest, &sig))
                .is_ok(),
        };

        match ok {
            true => Ok(()),
            false => Err(CertificateError::BadSignature.into()),
        }
    }
}

/// Handshake signature schemes we can check, offered in
/// signature_algorithms and CertificateRequest.
pub(crate) static VERIFY_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PKCS1_SHA512,
    SignatureScheme::RSA_PKCS1_SHA1,
    SignatureScheme::ECDSA_SHA1_Legacy,
];

/// Certificate signature algorithms accepted during chain validation.
pub(crate) static SUPPORTED_SIG_ALGS: &[&dyn SignatureVerificationAlgorithm] = &[
    &EcdsaP256Sha256,
    &EcdsaP256Sha384,
    &EcdsaP384Sha256,
    &EcdsaP384Sha384,
    &RsaPkcs1Sha256,
    &RsaPkcs1Sha384,
    &RsaPkcs1Sha512,
];

macro_rules! rsa_pkcs1_verify {
    ($name:ident, $digest:ty, $sig_alg:expr) => {
        #[derive(Debug)]
        struct $name;

        impl SignatureVerificationAlgorithm for $name {
            fn public_key_alg_id(&self) -> AlgorithmIdentifier {
                alg_id::RSA_ENCRYPTION
            }

            fn signature_alg_id(&self) -> AlgorithmIdentifier {
                $sig_alg
            }

            fn verify_signature(
                &self,
                public_key: &[u8],
                message: &[u8],
                signature: &[u8],
            ) -> Result<(), InvalidSignature> {
                let public_key = decode_spki_spk(public_key)?;

                let signature =
                    pkcs1v15::Signature::try_from(signature).map_err(|_| InvalidSignature)?;

                pkcs1v15::VerifyingKey::<$digest>::new(public_key)
                    .verify(message, &signature)
                    .map_err(|_| InvalidSignature)
            }
        }
    };
}

rsa_pkcs1_verify!(RsaPkcs1Sha256, sha2::Sha256, alg_id::RSA_PKCS1_SHA256);
rsa_pkcs1_verify!(RsaPkcs1Sha384, sha2::Sha384, alg_id::RSA_PKCS1_SHA384);
rsa_pkcs1_verify!(RsaPkcs1Sha512, sha2::Sha512, alg_id::RSA_PKCS1_SHA512);

macro_rules! ecdsa_verify {
    ($name:ident, $curve:ident, $key_alg:expr, $sig_alg:expr, $hash:expr) => {
        #[derive(Debug)]
        struct $name;

        impl SignatureVerificationAlgorithm for $name {
            fn public_key_alg_id(&self) -> AlgorithmIdentifier {
                $key_alg
            }

            fn signature_alg_id(&self) -> AlgorithmIdentifier {
                $sig_alg
            }

            fn verify_signature(
                &self,
                public_key: &[u8],
                message: &[u8],
                signature: &[u8],
            ) -> Result<(), InvalidSignature> {
                // public_key is the bare SEC1 point, not a whole SPKI.
                let key = $curve::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|_| InvalidSignature)?;
                let signature =
                    $curve::ecdsa::Signature::from_der(signature).map_err(|_| InvalidSignature)?;

                key.verify_prehash(&$hash.hash(message), &signature)
                    .map_err(|_| InvalidSignature)
            }
        }
    };
}

ecdsa_verify!(
    EcdsaP256Sha256,
    p256,
    alg_id::ECDSA_P256,
    alg_id::ECDSA_SHA256,
    HashAlgorithm::Sha256
);
ecdsa_verify!(
    EcdsaP256Sha384,
    p256,
    alg_id::ECDSA_P256,
    alg_id::ECDSA_SHA384,
    HashAlgorithm::Sha384
);
ecdsa_verify!(
    EcdsaP384Sha256,
    p384,
    alg_id::ECDSA_P384,
    alg_id::ECDSA_SHA256,
    HashAlgorithm::Sha256
);
ecdsa_verify!(
    EcdsaP384Sha384,
    p384,
    alg_id::ECDSA_P384,
    alg_id::ECDSA_SHA384,
    HashAlgorithm::Sha384
);

fn decode_spki_spk(spki_spk: &[u8]) -> Result<RsaPublicKey, InvalidSignature> {
    // public_key: only the key material, so decode the two integers by hand.
    let mut reader = der::SliceReader::new(spki_spk).map_err(|_| InvalidSignature)?;
    let ne: [der::asn1::UintRef<'_>; 2] = reader
        .decode()
        .map_err(|_| InvalidSignature)?;

    RsaPublicKey::new(
        BigUint::from_bytes_be(ne[0].as_bytes()),
        BigUint::from_bytes_be(ne[1].as_bytes()),
    )
    .map_err(|_| InvalidSignature)
}
