use cipher::StreamCipher;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq, ConstantTimeGreater, ConstantTimeLess};

use super::block::{Block, BlockPool};
use super::{encode_header, MAX_PLAINTEXT};
use crate::crypto::cipher::{BulkCipher, RecordMac, AEAD_TAG_LEN};
use crate::enums::{ContentType, ProtocolVersion};
use crate::error::Error;
use crate::rand;

/// The keys of one direction, installed at ChangeCipherSpec.
pub(crate) struct CipherSpec {
    cipher: BulkCipher,
    /// `None` for AEAD suites.
    mac: Option<RecordMac>,
}

impl CipherSpec {
    pub(crate) fn new(cipher: BulkCipher, mac: Option<RecordMac>) -> Self {
        Self { cipher, mac }
    }
}

/// Record protection state for one direction of a connection.
pub(crate) struct HalfConn {
    version: ProtocolVersion,
    active: Option<CipherSpec>,
    pending: Option<CipherSpec>,
    seq: u64,
    pub(crate) pool: BlockPool,
}

impl HalfConn {
    pub(crate) fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            active: None,
            pending: None,
            seq: 0,
            pool: BlockPool::default(),
        }
    }

    /// The version written in record headers and covered by the MAC.
    pub(crate) fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    #[cfg(test)]
    pub(crate) fn is_protected(&self) -> bool {
        self.active.is_some()
    }

    /// Stages keys to take effect at the next ChangeCipherSpec.
    pub(crate) fn prepare_cipher_spec(&mut self, spec: CipherSpec) {
        self.pending = Some(spec);
    }

    /// Activates the staged keys and restarts the sequence number.
    pub(crate) fn change_cipher_spec(&mut self) -> Result<(), Error> {
        let spec = self
            .pending
            .take()
            .ok_or_else(|| Error::General("ChangeCipherSpec with no pending keys".into()))?;
        self.active = Some(spec);
        self.seq = 0;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    #[cfg(test)]
    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    fn next_seq(&self) -> Result<u64, Error> {
        self.seq
            .checked_add(1)
            .ok_or(Error::SequenceNumberExhausted)
    }

    /// Protects `payload` and appends the whole record, header
    /// included, to `out`.
    pub(crate) fn encrypt(&mut self, typ: ContentType, payload: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let seq = self.seq;
        let next_seq = self.next_seq()?;
        let version = self.version;
        let mut body = self.pool.get();

        let sealed = match &mut self.active {
            None => {
                body.extend(payload);
                Ok(())
            }
            Some(spec) => seal(spec, seq, typ, version, payload, &mut body),
        };

        if sealed.is_ok() {
            encode_header(typ, version, body.len(), out);
            out.extend_from_slice(body.bytes());
            self.seq = next_seq;
        }
        self.pool.put(body);
        sealed
    }

    /// Removes protection from the record body in `rec`, leaving the
    /// plaintext in its place.
    ///
    /// Every MAC, padding or AEAD failure is the same `DecryptError`.
    pub(crate) fn decrypt(&mut self, typ: ContentType, rec: &mut Block) -> Result<(), Error> {
        let seq = self.seq;
        let next_seq = self.next_seq()?;
        let version = self.version;

        if let Some(spec) = &mut self.active {
            open(spec, seq, typ, version, rec)?;
        }

        if rec.len() > MAX_PLAINTEXT {
            return Err(Error::PeerSentOversizedRecord);
        }
        self.seq = next_seq;
        Ok(())
    }
}

fn missing_mac() -> Error {
    Error::General("stream or block cipher without a MAC".into())
}

fn seal(
    spec: &mut CipherSpec,
    seq: u64,
    typ: ContentType,
    version: ProtocolVersion,
    payload: &[u8],
    body: &mut Block,
) -> Result<(), Error> {
    match (&mut spec.cipher, &spec.mac) {
        (BulkCipher::Stream(rc4), Some(mac)) => {
            body.extend(payload);
            body.extend(&mac.compute(seq, typ, version, payload));
            rc4.apply_keystream(body.bytes_mut());
        }
        (BulkCipher::Block(cbc), Some(mac)) => {
            let block_len = cbc.block_len();
            let explicit_iv = match version.at_least(ProtocolVersion::TLSv1_1) {
                true => Some(rand::random_vec(block_len)?),
                false => None,
            };
            if let Some(iv) = &explicit_iv {
                body.extend(iv);
            }

            let start = body.len();
            body.extend(payload);
            body.extend(&mac.compute(seq, typ, version, payload));

            let unpadded = body.len() - start + 1;
            let pad = (block_len - unpadded % block_len) % block_len;
            body.extend(&vec![pad as u8; pad + 1]);

            cbc.encrypt(explicit_iv.as_deref(), &mut body.bytes_mut()[start..])?;
        }
        (BulkCipher::Aead(aead), _) => {
            let seq_bytes = seq.to_be_bytes();
            let explicit = &seq_bytes[..aead.explicit_nonce_len()];
            let nonce = aead.nonce(seq, explicit);
            let aad = make_aad(seq, typ, version, payload.len());

            body.extend(explicit);
            let start = body.len();
            body.extend(payload);
            let tag = aead.seal(&nonce, &aad, &mut body.bytes_mut()[start..])?;
            body.extend(&tag);
        }
        (_, None) => return Err(missing_mac()),
    }
    Ok(())
}

fn open(
    spec: &mut CipherSpec,
    seq: u64,
    typ: ContentType,
    version: ProtocolVersion,
    rec: &mut Block,
) -> Result<(), Error> {
    match (&mut spec.cipher, &spec.mac) {
        (BulkCipher::Stream(rc4), Some(mac)) => {
            let data_len = rec
                .len()
                .checked_sub(mac.len())
                .ok_or(Error::DecryptError)?;
            rc4.apply_keystream(rec.bytes_mut());

            let (data, tag) = rec.bytes().split_at(data_len);
            let expect = mac.compute(seq, typ, version, data);
            if !bool::from(expect.ct_eq(tag)) {
                return Err(Error::DecryptError);
            }
            rec.truncate(data_len);
        }
        (BulkCipher::Block(cbc), Some(mac)) => {
            let block_len = cbc.block_len();
            let explicit_len = match version.at_least(ProtocolVersion::TLSv1_1) {
                true => block_len,
                false => 0,
            };

            // lengths are public, so these checks may branch
            let body_len = rec
                .len()
                .checked_sub(explicit_len)
                .ok_or(Error::DecryptError)?;
            let min_len = (mac.len() + block_len) / block_len * block_len;
            if body_len < min_len || body_len % block_len != 0 {
                return Err(Error::DecryptError);
            }

            let (iv, body) = rec
                .bytes_mut()
                .split_at_mut(explicit_len);
            let explicit_iv = match explicit_len {
                0 => None,
                _ => Some(&*iv),
            };
            cbc.decrypt(explicit_iv, body)?;

            let (data_len, padding_good) = match version {
                ProtocolVersion::SSLv3 => ssl3_unpad(body, block_len, mac.len()),
                _ => tls_unpad(body, mac.len()),
            };
            let expect = mac.compute(seq, typ, version, &body[..data_len]);
            let mac_good = expect.ct_eq(&body[data_len..data_len + mac.len()]);
            if !bool::from(padding_good & mac_good) {
                return Err(Error::DecryptError);
            }

            rec.consume(explicit_len);
            rec.truncate(data_len);
        }
        (BulkCipher::Aead(aead), _) => {
            let explicit_len = aead.explicit_nonce_len();
            let data_len = rec
                .len()
                .checked_sub(explicit_len + AEAD_TAG_LEN)
                .ok_or(Error::DecryptError)?;

            let (explicit, rest) = rec
                .bytes_mut()
                .split_at_mut(explicit_len);
            let (data, tag) = rest.split_at_mut(data_len);
            let nonce = aead.nonce(seq, explicit);
            let aad = make_aad(seq, typ, version, data_len);
            aead.open(&nonce, &aad, data, tag)?;

            rec.consume(explicit_len);
            rec.truncate(data_len);
        }
        (_, None) => return Err(missing_mac()),
    }
    Ok(())
}

/// `seq | type | version | length`
fn make_aad(seq: u64, typ: ContentType, version: ProtocolVersion, len: usize) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&seq.to_be_bytes());
    aad[8] = u8::from(typ);
    aad[9..11].copy_from_slice(&u16::from(version).to_be_bytes());
    aad[11..].copy_from_slice(&(len as u16).to_be_bytes());
    aad
}

/// TLS padding: the last byte gives the padding length and every
/// padding byte must equal it.  Returns the data length and whether
/// the padding was good, examining the same bytes whatever the padding
/// length.  On bad padding nothing is removed, so the MAC check still
/// runs over plausible data.
///
/// `body` must hold at least `mac_len + 1` bytes.
fn tls_unpad(body: &[u8], mac_len: usize) -> (usize, Choice) {
    let len = body.len();
    let pad = body[len - 1];
    let pad_len = u32::from(pad) + 1;

    let mut good = !pad_len.ct_gt(&((len - mac_len) as u32));
    for i in 0..len.min(256) {
        let in_padding = (i as u32).ct_lt(&pad_len);
        good &= !in_padding | body[len - 1 - i].ct_eq(&pad);
    }

    let removed = u32::conditional_select(&0, &pad_len, good);
    (len - mac_len - removed as usize, good)
}

/// SSLv3 padding: only the length byte is meaningful, and the padding
/// must be shorter than a block.
fn ssl3_unpad(body: &[u8], block_len: usize, mac_len: usize) -> (usize, Choice) {
    let len = body.len();
    let pad_len = u32::from(body[len - 1]) + 1;

    let good = !pad_len.ct_gt(&(block_len as u32)) & !pad_len.ct_gt(&((len - mac_len) as u32));
    let removed = u32::conditional_select(&0, &pad_len, good);
    (len - mac_len - removed as usize, good)
}
