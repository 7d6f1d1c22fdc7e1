use core::fmt;

use pki_types::CertificateDer;
use zeroize::Zeroizing;

use crate::enums::{CipherSuite, ProtocolVersion};
use crate::error::InvalidMessage;
use crate::msgs::base::PayloadU16;
use crate::msgs::codec::{Codec, Reader};
use crate::msgs::handshake::SessionId;

/// What a server needs to resume a session: carried inside tickets and
/// stored in the session-id cache.
///
/// Layout: `version(2) | cipher_suite(2) | master_secret(u16 length) |
/// cert_count(2) | { cert_len(4) | cert }*`.
#[derive(Clone, PartialEq)]
pub struct SessionState {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub master_secret: Zeroizing<Vec<u8>>,
    /// The client's certificate chain when it authenticated.
    pub certificates: Vec<CertificateDer<'static>>,
}

impl SessionState {
    pub fn new(
        version: ProtocolVersion,
        cipher_suite: CipherSuite,
        master_secret: &[u8],
        certificates: Vec<CertificateDer<'static>>,
    ) -> Self {
        Self {
            version,
            cipher_suite,
            master_secret: Zeroizing::new(master_secret.to_vec()),
            certificates,
        }
    }

    pub(crate) fn master_secret(&self) -> Option<[u8; 48]> {
        self.master_secret
            .as_slice()
            .try_into()
            .ok()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("version", &self.version)
            .field("cipher_suite", &self.cipher_suite)
            .field("certificates", &self.certificates.len())
            .finish_non_exhaustive()
    }
}

impl Codec<'_> for SessionState {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.version.encode(bytes);
        self.cipher_suite.encode(bytes);
        PayloadU16::encode_slice(&self.master_secret, bytes);
        (self.certificates.len() as u16).encode(bytes);
        for cert in &self.certificates {
            (cert.as_ref().len() as u32).encode(bytes);
            bytes.extend_from_slice(cert.as_ref());
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let version = ProtocolVersion::read(r)?;
        let cipher_suite = CipherSuite::read(r)?;
        let master_secret = Zeroizing::new(PayloadU16::read(r)?.0);
        if master_secret.len() != 48 {
            return Err(InvalidMessage::MissingData("SessionState master secret"));
        }

        let count = u16::read(r)?;
        let mut certificates = Vec::with_capacity(usize::from(count).min(8));
        for _ in 0..count {
            let len = u32::read(r)? as usize;
            let der = r
                .take(len)
                .ok_or(InvalidMessage::MissingData("SessionState certificate"))?;
            certificates.push(CertificateDer::from(der.to_vec()));
        }

        r.expect_empty("SessionState")?;
        Ok(Self {
            version,
            cipher_suite,
            master_secret,
            certificates,
        })
    }
}

/// A session remembered by a client: the resumable state plus whatever
/// identifies it to the server.
#[derive(Clone, Debug)]
pub struct ClientSessionValue {
    pub state: SessionState,
    /// Empty when the server only issued a ticket.
    pub session_id: SessionId,
    /// Empty when the server did not issue a ticket.
    pub ticket: Vec<u8>,
}

impl ClientSessionValue {
    pub fn new(state: SessionState, session_id: SessionId, ticket: Vec<u8>) -> Self {
        Self {
            state,
            session_id,
            ticket,
        }
    }
}
