//! Record ciphers: the stream, CBC block and AEAD algorithms that suites
//! name, and the MAC-then-encrypt construction around them.

use aes::{Aes128, Aes256};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use cipher::block_padding::NoPadding;
use cipher::consts::U16;
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit};
use chacha20poly1305::ChaCha20Poly1305;
use des::TdesEde3;
use rc4::Rc4;

use super::hash::HashAlgorithm;
use super::hmac;
use crate::enums::{ContentType, ProtocolVersion};
use crate::error::Error;

/// Length of the GCM and Poly1305 authentication tags.
pub(crate) const AEAD_TAG_LEN: usize = 16;

/// The bulk encryption algorithms a cipher suite can name.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkAlgorithm {
    /// RC4 with a 128-bit key.
    Rc4_128,
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-256 in CBC mode.
    Aes256Cbc,
    /// Three-key 3DES (EDE) in CBC mode.
    TripleDesCbc,
    /// AES-128-GCM.
    Aes128Gcm,
    /// AES-256-GCM.
    Aes256Gcm,
    /// ChaCha20-Poly1305 as in RFC 7905.
    ChaCha20Poly1305,
}

impl BulkAlgorithm {
    /// Bytes of key taken from the key block.
    pub fn key_len(self) -> usize {
        match self {
            Self::Rc4_128 | Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::TripleDesCbc => 24,
            Self::Aes256Cbc | Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    /// Bytes of IV taken from the key block: the CBC IV, the GCM salt
    /// or the ChaCha20 nonce mask.
    pub fn iv_len(self) -> usize {
        match self {
            Self::Rc4_128 => 0,
            Self::Aes128Cbc | Self::Aes256Cbc => 16,
            Self::TripleDesCbc => 8,
            Self::Aes128Gcm | Self::Aes256Gcm => 4,
            Self::ChaCha20Poly1305 => 12,
        }
    }

    /// The cipher authenticates records itself, with no separate MAC.
    pub fn is_aead(self) -> bool {
        matches!(
            self,
            Self::Aes128Gcm | Self::Aes256Gcm | Self::ChaCha20Poly1305
        )
    }

    pub(crate) fn new_cipher(self, key: &[u8], iv: &[u8]) -> Result<BulkCipher, Error> {
        let bad_key = |_| Error::General(format!("bad key material for {:?}", self));
        Ok(match self {
            Self::Rc4_128 => BulkCipher::Stream(Box::new(
                Rc4::<U16>::new_from_slice(key).map_err(bad_key)?,
            )),
            Self::Aes128Cbc => BulkCipher::Block(CbcCipher {
                key: CbcKey::Aes128(Aes128::new_from_slice(key).map_err(bad_key)?),
                iv: iv.to_vec(),
            }),
            Self::Aes256Cbc => BulkCipher::Block(CbcCipher {
                key: CbcKey::Aes256(Aes256::new_from_slice(key).map_err(bad_key)?),
                iv: iv.to_vec(),
            }),
            Self::TripleDesCbc => BulkCipher::Block(CbcCipher {
                key: CbcKey::TdesEde3(TdesEde3::new_from_slice(key).map_err(bad_key)?),
                iv: iv.to_vec(),
            }),
            Self::Aes128Gcm => BulkCipher::Aead(AeadCipher::Aes128Gcm {
                cipher: Box::new(Aes128Gcm::new_from_slice(key).map_err(bad_key)?),
                salt: salt(iv)?,
            }),
            Self::Aes256Gcm => BulkCipher::Aead(AeadCipher::Aes256Gcm {
                cipher: Box::new(Aes256Gcm::new_from_slice(key).map_err(bad_key)?),
                salt: salt(iv)?,
            }),
            Self::ChaCha20Poly1305 => BulkCipher::Aead(AeadCipher::ChaCha20Poly1305 {
                cipher: Box::new(ChaCha20Poly1305::new_from_slice(key).map_err(bad_key)?),
                iv: iv
                    .try_into()
                    .map_err(|_| Error::General("bad ChaCha20 IV length".into()))?,
            }),
        })
    }
}

fn salt(iv: &[u8]) -> Result<[u8; 4], Error> {
    iv.try_into()
        .map_err(|_| Error::General("bad GCM salt length".into()))
}

/// The cipher state of one record-layer direction.
pub(crate) enum BulkCipher {
    Stream(Box<Rc4<U16>>),
    Block(CbcCipher),
    Aead(AeadCipher),
}

pub(crate) enum CbcKey {
    Aes128(Aes128),
    Aes256(Aes256),
    TdesEde3(TdesEde3),
}

/// A CBC key plus the IV carried between records, which SSLv3 and
/// TLS 1.0 chain from the last ciphertext block.
pub(crate) struct CbcCipher {
    key: CbcKey,
    iv: Vec<u8>,
}

fn cbc_encrypt<C>(key: &C, iv: &[u8], buf: &mut [u8]) -> Result<(), Error>
where
    C: BlockEncryptMut + BlockCipher + Clone,
{
    let len = buf.len();
    cbc::Encryptor::<C>::inner_iv_slice_init(key.clone(), iv)
        .map_err(|_| Error::EncryptError)?
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::EncryptError)?;
    Ok(())
}

fn cbc_decrypt<C>(key: &C, iv: &[u8], buf: &mut [u8]) -> Result<(), Error>
where
    C: BlockDecryptMut + BlockCipher + Clone,
{
    cbc::Decryptor::<C>::inner_iv_slice_init(key.clone(), iv)
        .map_err(|_| Error::DecryptError)?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::DecryptError)?;
    Ok(())
}

impl CbcCipher {
    pub(crate) fn block_len(&self) -> usize {
        match self.key {
            CbcKey::TdesEde3(_) => 8,
            _ => 16,
        }
    }

    /// Encrypts whole blocks in place.  With `explicit_iv` the record
    /// carries its own IV; otherwise the chained IV is used and
    /// replaced by the last ciphertext block.
    pub(crate) fn encrypt(&mut self, explicit_iv: Option<&[u8]>, buf: &mut [u8]) -> Result<(), Error> {
        let iv = explicit_iv.unwrap_or(&self.iv);
        match &self.key {
            CbcKey::Aes128(k) => cbc_encrypt(k, iv, buf)?,
            CbcKey::Aes256(k) => cbc_encrypt(k, iv, buf)?,
            CbcKey::TdesEde3(k) => cbc_encrypt(k, iv, buf)?,
        }

        if explicit_iv.is_none() {
            let bs = self.block_len();
            self.iv = buf[buf.len() - bs..].to_vec();
        }
        Ok(())
    }

    pub(crate) fn decrypt(&mut self, explicit_iv: Option<&[u8]>, buf: &mut [u8]) -> Result<(), Error> {
        let bs = self.block_len();
        if buf.is_empty() || buf.len() % bs != 0 {
            return Err(Error::DecryptError);
        }

        let next_iv = buf[buf.len() - bs..].to_vec();
        let iv = explicit_iv.unwrap_or(&self.iv);
        match &self.key {
            CbcKey::Aes128(k) => cbc_decrypt(k, iv, buf)?,
            CbcKey::Aes256(k) => cbc_decrypt(k, iv, buf)?,
            CbcKey::TdesEde3(k) => cbc_decrypt(k, iv, buf)?,
        }

        if explicit_iv.is_none() {
            self.iv = next_iv;
        }
        Ok(())
    }
}

pub(crate) enum AeadCipher {
    Aes128Gcm {
        cipher: Box<Aes128Gcm>,
        salt: [u8; 4],
    },
    Aes256Gcm {
        cipher: Box<Aes256Gcm>,
        salt: [u8; 4],
    },
    ChaCha20Poly1305 {
        cipher: Box<ChaCha20Poly1305>,
        iv: [u8; 12],
    },
}

impl AeadCipher {
    /// Nonce bytes carried in each record ahead of the ciphertext.
    pub(crate) fn explicit_nonce_len(&self) -> usize {
        match self {
            Self::ChaCha20Poly1305 { .. } => 0,
            _ => 8,
        }
    }

    /// The full nonce.  GCM takes the explicit part from the record
    /// (we send the sequence number there); ChaCha20-Poly1305 XORs the
    /// sequence number into its IV.
    pub(crate) fn nonce(&self, seq: u64, explicit: &[u8]) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        match self {
            Self::Aes128Gcm { salt, .. } | Self::Aes256Gcm { salt, .. } => {
                nonce[..4].copy_from_slice(salt);
                nonce[4..].copy_from_slice(explicit);
            }
            Self::ChaCha20Poly1305 { iv, .. } => {
                nonce.copy_from_slice(iv);
                for (n, s) in nonce[4..]
                    .iter_mut()
                    .zip(seq.to_be_bytes())
                {
                    *n ^= s;
                }
            }
        }
        nonce
    }

    /// Encrypts `buf` in place, returning the tag.
    pub(crate) fn seal(&self, nonce: &[u8; 12], aad: &[u8], buf: &mut [u8]) -> Result<Vec<u8>, Error> {
        let nonce = GenericArray::from_slice(nonce);
        let tag = match self {
            Self::Aes128Gcm { cipher, .. } => cipher.encrypt_in_place_detached(nonce, aad, buf),
            Self::Aes256Gcm { cipher, .. } => cipher.encrypt_in_place_detached(nonce, aad, buf),
            Self::ChaCha20Poly1305 { cipher, .. } => {
                cipher.encrypt_in_place_detached(nonce, aad, buf)
            }
        };
        tag.map(|t| t.to_vec())
            .map_err(|_| Error::EncryptError)
    }

    pub(crate) fn open(&self, nonce: &[u8; 12], aad: &[u8], buf: &mut [u8], tag: &[u8]) -> Result<(), Error> {
        if tag.len() != AEAD_TAG_LEN {
            return Err(Error::DecryptError);
        }
        let nonce = GenericArray::from_slice(nonce);
        let tag = GenericArray::from_slice(tag);
        match self {
            Self::Aes128Gcm { cipher, .. } => cipher.decrypt_in_place_detached(nonce, aad, buf, tag),
            Self::Aes256Gcm { cipher, .. } => cipher.decrypt_in_place_detached(nonce, aad, buf, tag),
            Self::ChaCha20Poly1305 { cipher, .. } => {
                cipher.decrypt_in_place_detached(nonce, aad, buf, tag)
            }
        }
        .map_err(|_| Error::DecryptError)
    }
}

/// The MAC of a stream or block cipher suite.  SSLv3 uses its own
/// pre-HMAC construction; every later version uses HMAC.
#[derive(Clone)]
pub(crate) enum RecordMac {
    Ssl3 { alg: HashAlgorithm, secret: Vec<u8> },
    Hmac(hmac::Key),
}

impl RecordMac {
    pub(crate) fn new(version: ProtocolVersion, alg: HashAlgorithm, secret: &[u8]) -> Self {
        match version {
            ProtocolVersion::SSLv3 => Self::Ssl3 {
                alg,
                secret: secret.to_vec(),
            },
            _ => Self::Hmac(hmac::Key::new(alg, secret)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Ssl3 { alg, .. } => alg.output_len(),
            Self::Hmac(key) => key.tag_len(),
        }
    }

    /// MAC over `seq | type | version | length | data`; SSLv3 omits the
    /// version.
    pub(crate) fn compute(&self, seq: u64, typ: ContentType, version: ProtocolVersion, data: &[u8]) -> Vec<u8> {
        let seq = seq.to_be_bytes();
        let typ = [u8::from(typ)];
        let len = (data.len() as u16).to_be_bytes();

        match self {
            Self::Ssl3 { alg, secret } => {
                let pad_len = match alg {
                    HashAlgorithm::Md5 => 48,
                    _ => 40,
                };

                let mut inner = alg.start();
                inner.update(secret);
                inner.update(&[0x36; 48][..pad_len]);
                inner.update(&seq);
                inner.update(&typ);
                inner.update(&len);
                inner.update(data);
                let inner = inner.finish();

                let mut outer = alg.start();
                outer.update(secret);
                outer.update(&[0x5c; 48][..pad_len]);
                outer.update(&inner);
                outer.finish()
            }
            Self::Hmac(key) => key.sign(&[
                &seq[..],
                &typ[..],
                &u16::from(version).to_be_bytes()[..],
                &len[..],
                data,
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbc_chains_iv_between_records() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let mut enc = BulkAlgorithm::Aes128Cbc
            .new_cipher(&key, &iv)
            .unwrap();
        let mut dec = BulkAlgorithm::Aes128Cbc
            .new_cipher(&key, &iv)
            .unwrap();

        let (BulkCipher::Block(enc), BulkCipher::Block(dec)) = (&mut enc, &mut dec) else {
            panic!("expected block ciphers");
        };

        for _ in 0..3 {
            let mut buf = [0x42u8; 32];
            enc.encrypt(None, &mut buf).unwrap();
            dec.decrypt(None, &mut buf).unwrap();
            assert_eq!(buf, [0x42u8; 32]);
        }
        assert_eq!(enc.iv, dec.iv);
    }

    #[test]
    fn cbc_rejects_partial_blocks() {
        let mut c = BulkAlgorithm::TripleDesCbc
            .new_cipher(&[1u8; 24], &[0u8; 8])
            .unwrap();
        let BulkCipher::Block(c) = &mut c else {
            panic!("expected block cipher");
        };
        assert_eq!(c.decrypt(None, &mut [0u8; 12]), Err(Error::DecryptError));
    }

    #[test]
    fn aead_rejects_modified_tag() {
        let c = BulkAlgorithm::ChaCha20Poly1305
            .new_cipher(&[3u8; 32], &[4u8; 12])
            .unwrap();
        let BulkCipher::Aead(c) = c else {
            panic!("expected aead");
        };
        let nonce = c.nonce(5, &[]);
        let mut buf = *b"hello";
        let mut tag = c.seal(&nonce, b"aad", &mut buf).unwrap();
        tag[0] ^= 1;
        assert_eq!(c.open(&nonce, b"aad", &mut buf, &tag), Err(Error::DecryptError));
    }

    #[test]
    fn ssl3_mac_differs_from_hmac() {
        let ssl3 = RecordMac::new(ProtocolVersion::SSLv3, HashAlgorithm::Sha1, &[1; 20]);
        let tls = RecordMac::new(ProtocolVersion::TLSv1_0, HashAlgorithm::Sha1, &[1; 20]);
        let a = ssl3.compute(0, ContentType::ApplicationData, ProtocolVersion::SSLv3, b"x");
        let b = tls.compute(0, ContentType::ApplicationData, ProtocolVersion::TLSv1_0, b"x");
        assert_eq!(a.len(), 20);
        assert_eq!(ssl3.len(), tls.len());
        assert_ne!(a, b);
    }
}
