use std::fmt;
use std::sync::RwLock;

use aes::Aes128;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::hmac;
use crate::error::Error;
use crate::rand;
use crate::server::ProducesTickets;

const KEY_NAME_LEN: usize = 16;
const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;

/// One session ticket key: a public name that lets the server find the
/// key again, plus the encryption and MAC keys.
struct TicketKey {
    name: [u8; KEY_NAME_LEN],
    aes: Zeroizing<[u8; 16]>,
    hmac: Zeroizing<[u8; 16]>,
}

impl TicketKey {
    /// Derives the key from a 32-byte secret: SHA-512 of the secret,
    /// split into name, AES key and HMAC key.
    fn from_secret(secret: &[u8; 32]) -> Self {
        let hashed = Zeroizing::new(HashAlgorithm::Sha512.hash(secret));
        let mut key = Self {
            name: [0u8; KEY_NAME_LEN],
            aes: Zeroizing::new([0u8; 16]),
            hmac: Zeroizing::new([0u8; 16]),
        };
        key.name
            .copy_from_slice(&hashed[..16]);
        key.aes
            .copy_from_slice(&hashed[16..32]);
        key.hmac
            .copy_from_slice(&hashed[32..48]);
        key
    }

    fn mac(&self, data: &[u8]) -> Vec<u8> {
        hmac::Key::new(HashAlgorithm::Sha256, &self.hmac[..]).sign(&[data])
    }

    fn encrypt(&self, message: &[u8]) -> Option<Vec<u8>> {
        let mut iv = [0u8; IV_LEN];
        rand::fill_random(&mut iv).ok()?;

        let encryptor = cbc::Encryptor::<Aes128>::new_from_slices(&self.aes[..], &iv).ok()?;
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(message);

        let mut ticket = Vec::with_capacity(KEY_NAME_LEN + IV_LEN + ciphertext.len() + MAC_LEN);
        ticket.extend_from_slice(&self.name);
        ticket.extend_from_slice(&iv);
        ticket.extend_from_slice(&ciphertext);
        let mac = self.mac(&ticket);
        ticket.extend_from_slice(&mac);
        Some(ticket)
    }

    fn decrypt(&self, ticket: &[u8]) -> Option<Vec<u8>> {
        let (authenticated, mac) = ticket.split_at(ticket.len() - MAC_LEN);
        if !bool::from(self.mac(authenticated).ct_eq(mac)) {
            return None;
        }

        let iv = &authenticated[KEY_NAME_LEN..KEY_NAME_LEN + IV_LEN];
        let ciphertext = &authenticated[KEY_NAME_LEN + IV_LEN..];
        cbc::Decryptor::<Aes128>::new_from_slices(&self.aes[..], iv)
            .ok()?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()
    }
}

/// A `ProducesTickets` implementation holding an ordered set of ticket
/// keys.  The first key encrypts new tickets; every key is tried when
/// decrypting, so replacing the set with `[new, old]` rotates keys
/// without invalidating outstanding tickets.
///
/// Tickets are `key_name(16) | iv(16) | AES-128-CBC(state) |
/// HMAC-SHA256(32)`, the MAC covering everything before it.
pub struct Ticketer {
    keys: RwLock<Vec<TicketKey>>,
    lifetime: u32,
}

impl Ticketer {
    /// Make a ticketer with a single random key.
    pub fn new() -> Result<Self, Error> {
        let mut secret = Zeroizing::new([0u8; 32]);
        rand::fill_random(&mut secret[..])?;
        Self::from_secrets(&[*secret])
    }

    /// Make a ticketer from externally managed secrets, the first of
    /// which encrypts.
    pub fn from_secrets(secrets: &[[u8; 32]]) -> Result<Self, Error> {
        Ok(Self {
            keys: RwLock::new(derive_keys(secrets)?),
            lifetime: 60 * 60 * 12,
        })
    }

    /// Replace the key set.
    pub fn set_secrets(&self, secrets: &[[u8; 32]]) -> Result<(), Error> {
        let keys = derive_keys(secrets)?;
        let mut current = self
            .keys
            .write()
            .map_err(|_| Error::General("ticket key lock poisoned".into()))?;
        *current = keys;
        Ok(())
    }
}

fn derive_keys(secrets: &[[u8; 32]]) -> Result<Vec<TicketKey>, Error> {
    if secrets.is_empty() {
        return Err(Error::InvalidConfig("no session ticket keys".into()));
    }
    Ok(secrets
        .iter()
        .map(TicketKey::from_secret)
        .collect())
}

impl ProducesTickets for Ticketer {
    fn enabled(&self) -> bool {
        true
    }

    fn lifetime(&self) -> u32 {
        self.lifetime
    }

    fn encrypt(&self, message: &[u8]) -> Option<Vec<u8>> {
        let keys = self.keys.read().ok()?;
        keys.first()?.encrypt(message)
    }

    fn decrypt(&self, ticket: &[u8]) -> Option<Vec<u8>> {
        // the shortest ticket has one block of ciphertext
        if ticket.len() < KEY_NAME_LEN + IV_LEN + 16 + MAC_LEN {
            return None;
        }

        let keys = self.keys.read().ok()?;
        let name = &ticket[..KEY_NAME_LEN];
        keys.iter()
            .find(|key| key.name == name)?
            .decrypt(ticket)
    }
}

impl fmt::Debug for Ticketer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticketer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
