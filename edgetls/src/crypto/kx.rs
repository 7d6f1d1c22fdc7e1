use rand_core::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use subtle::{ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::enums::ProtocolVersion;
use crate::error::{Error, PeerMisbehaved};
use crate::msgs::enums::NamedGroup;
use crate::rand;

/// Groups we offer and accept for ECDHE, in preference order.
pub(crate) const SUPPORTED_GROUPS: &[NamedGroup] = &[
    NamedGroup::X25519,
    NamedGroup::secp256r1,
    NamedGroup::secp384r1,
];

enum EphemeralSecret {
    X25519(x25519_dalek::EphemeralSecret),
    P256(p256::ecdh::EphemeralSecret),
    P384(p384::ecdh::EphemeralSecret),
}

/// An in-progress ECDHE key exchange: our private key and the public
/// key we send.
pub(crate) struct KeyExchange {
    secret: EphemeralSecret,
    pub(crate) pub_key: Vec<u8>,
}

impl KeyExchange {
    pub(crate) fn start(group: NamedGroup) -> Result<Self, Error> {
        let (secret, pub_key) = match group {
            NamedGroup::X25519 => {
                let secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
                let public = x25519_dalek::PublicKey::from(&secret);
                (EphemeralSecret::X25519(secret), public.as_bytes().to_vec())
            }
            NamedGroup::secp256r1 => {
                let secret = p256::ecdh::EphemeralSecret::random(&mut OsRng);
                let public = p256::EncodedPoint::from(secret.public_key());
                (EphemeralSecret::P256(secret), public.as_bytes().to_vec())
            }
            NamedGroup::secp384r1 => {
                let secret = p384::ecdh::EphemeralSecret::random(&mut OsRng);
                let public = p384::EncodedPoint::from(secret.public_key());
                (EphemeralSecret::P384(secret), public.as_bytes().to_vec())
            }
            _ => return Err(Error::General(format!("unsupported group {:?}", group))),
        };

        Ok(Self { secret, pub_key })
    }

    /// Completes the exchange with the peer's public key, returning the
    /// premaster secret.
    pub(crate) fn complete(self, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        let bad_share = || Error::PeerMisbehaved(PeerMisbehaved::InvalidKeyShare);
        let shared = match self.secret {
            EphemeralSecret::X25519(secret) => {
                let peer: [u8; 32] = peer.try_into().map_err(|_| bad_share())?;
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                if !shared.was_contributory() {
                    return Err(bad_share());
                }
                shared.as_bytes().to_vec()
            }
            EphemeralSecret::P256(secret) => {
                let peer = p256::PublicKey::from_sec1_bytes(peer).map_err(|_| bad_share())?;
                secret
                    .diffie_hellman(&peer)
                    .raw_secret_bytes()
                    .to_vec()
            }
            EphemeralSecret::P384(secret) => {
                let peer = p384::PublicKey::from_sec1_bytes(peer).map_err(|_| bad_share())?;
                secret
                    .diffie_hellman(&peer)
                    .raw_secret_bytes()
                    .to_vec()
            }
        };
        Ok(Zeroizing::new(shared))
    }
}

/// Client side of RSA key transport: a fresh premaster secret carrying
/// `client_version`, and its encryption under the server's key.
pub(crate) fn rsa_encrypt_premaster(
    key: &RsaPublicKey,
    client_version: ProtocolVersion,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), Error> {
    let mut premaster = Zeroizing::new(vec![0u8; 48]);
    rand::fill_random(&mut premaster[2..])?;
    premaster[..2].copy_from_slice(&u16::from(client_version).to_be_bytes());

    let encrypted = key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, &premaster)
        .map_err(|_| Error::EncryptError)?;
    Ok((premaster, encrypted))
}

/// Server side of RSA key transport.
///
/// A decryption failure or a wrongly sized plaintext yields a random
/// premaster secret instead of an error, selected without branching,
/// so the handshake fails later at Finished and the peer learns nothing
/// about the padding (RFC 5246, section 7.4.7.1).
pub(crate) fn rsa_decrypt_premaster(
    key: &RsaPrivateKey,
    encrypted: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut fallback = Zeroizing::new(vec![0u8; 48]);
    rand::fill_random(&mut fallback)?;

    let decrypted = Zeroizing::new(
        key.decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, encrypted)
            .unwrap_or_default(),
    );
    let good = (decrypted.len() as u32).ct_eq(&48);

    let mut premaster = Zeroizing::new(vec![0u8; 48]);
    for (i, out) in premaster.iter_mut().enumerate() {
        let candidate = decrypted.get(i).copied().unwrap_or(0);
        *out = u8::conditional_select(&fallback[i], &candidate, good);
    }
    Ok(premaster)
}
