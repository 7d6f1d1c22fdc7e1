use core::mem;

use crate::crypto::hash::{Context, HashAlgorithm};
use crate::enums::ProtocolVersion;
use crate::msgs::message::{Message, MessagePayload};

/// SSLv3 Finished sender labels.
pub(crate) const SSL3_CLIENT_SENDER: &[u8; 4] = b"CLNT";
pub(crate) const SSL3_SERVER_SENDER: &[u8; 4] = b"SRVR";

const SSL3_PAD1: u8 = 0x36;
const SSL3_PAD2: u8 = 0x5c;

/// Early stage buffering of handshake payloads.
///
/// Before we know the version and cipher suite that fix the
/// transcript hash, we just buffer the messages.
pub(crate) struct HandshakeHashBuffer {
    buffer: Vec<u8>,
    client_auth_enabled: bool,
}

impl HandshakeHashBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::new(),
            client_auth_enabled: false,
        }
    }

    /// We might be doing client auth, so need to keep a full
    /// log of the handshake.
    pub(crate) fn set_client_auth_enabled(&mut self) {
        self.client_auth_enabled = true;
    }

    /// Hash/buffer a handshake message.
    pub(crate) fn add_message(&mut self, m: &Message) {
        if let MessagePayload::Handshake { encoded, .. } = &m.payload {
            self.add_raw(&encoded.0);
        }
    }

    /// Buffer bytes that did not arrive as a handshake message, such as
    /// an SSLv2-framed ClientHello.
    pub(crate) fn add_raw(&mut self, buf: &[u8]) {
        self.buffer.extend_from_slice(buf);
    }

    /// We now know what hash function the verify_data will use.
    ///
    /// `prf_hash` only matters from TLS 1.2; earlier versions use
    /// MD5 and SHA-1 side by side.
    pub(crate) fn start_hash(self, version: ProtocolVersion, prf_hash: HashAlgorithm) -> HandshakeHash {
        let mut hh = HandshakeHash {
            version,
            md5: HashAlgorithm::Md5.start(),
            sha1: HashAlgorithm::Sha1.start(),
            prf: prf_hash.start(),
            client_auth: None,
        };
        hh.update_raw(&self.buffer);
        if self.client_auth_enabled {
            hh.client_auth = Some(self.buffer);
        }
        hh
    }
}

/// This deals with keeping a running hash of the handshake
/// payloads.
///
/// For client auth in TLS 1.2 we also need to buffer all the messages,
/// since the signature hash is chosen independently of the PRF hash.
pub(crate) struct HandshakeHash {
    version: ProtocolVersion,
    md5: Context,
    sha1: Context,
    prf: Context,

    /// buffer for client-auth.
    client_auth: Option<Vec<u8>>,
}

impl HandshakeHash {
    /// We decided not to do client auth after all, so discard
    /// the transcript.
    pub(crate) fn abandon_client_auth(&mut self) {
        self.client_auth = None;
    }

    /// Hash/buffer a handshake message.
    pub(crate) fn add_message(&mut self, m: &Message) -> &mut Self {
        if let MessagePayload::Handshake { encoded, .. } = &m.payload {
            self.update_raw(&encoded.0);
        }
        self
    }

    /// Hash or buffer a byte slice.
    fn update_raw(&mut self, buf: &[u8]) -> &mut Self {
        match self.version.at_least(ProtocolVersion::TLSv1_2) {
            true => self.prf.update(buf),
            false => {
                self.md5.update(buf);
                self.sha1.update(buf);
            }
        }

        if let Some(buffer) = &mut self.client_auth {
            buffer.extend_from_slice(buf);
        }

        self
    }

    /// The running transcript hash as the TLS PRF consumes it:
    /// the suite hash from TLS 1.2, `MD5 || SHA1` before.
    pub(crate) fn current_hash(&self) -> Vec<u8> {
        match self.version.at_least(ProtocolVersion::TLSv1_2) {
            true => self.prf.fork_finish(),
            false => {
                let mut out = self.md5.fork_finish();
                out.extend(self.sha1.fork_finish());
                out
            }
        }
    }

    /// The SSLv3 form of the transcript hash, keyed with the master
    /// secret.  `sender` is one of the Finished labels, or empty for
    /// CertificateVerify.
    pub(crate) fn ssl3_hash(&self, master_secret: &[u8], sender: &[u8]) -> Vec<u8> {
        let mut out = ssl3_inner(self.md5.clone(), HashAlgorithm::Md5, 48, master_secret, sender);
        out.extend(ssl3_inner(
            self.sha1.clone(),
            HashAlgorithm::Sha1,
            40,
            master_secret,
            sender,
        ));
        out
    }

    /// Take the handshake buffer, if any.
    pub(crate) fn take_handshake_buf(&mut self) -> Option<Vec<u8>> {
        mem::take(&mut self.client_auth)
    }

    /// The digest a pre-TLS 1.2 CertificateVerify signs: `MD5 || SHA1`
    /// of the transcript, in the SSLv3 keyed form when needed.
    pub(crate) fn legacy_verify_digest(&self, master_secret: &[u8]) -> Vec<u8> {
        match self.version {
            ProtocolVersion::SSLv3 => self.ssl3_hash(master_secret, b""),
            _ => self.current_hash(),
        }
    }
}

/// `hash(master + pad2 + hash(handshake + sender + master + pad1))`
fn ssl3_inner(
    mut ctx: Context,
    alg: HashAlgorithm,
    pad_len: usize,
    master_secret: &[u8],
    sender: &[u8],
) -> Vec<u8> {
    ctx.update(sender);
    ctx.update(master_secret);
    ctx.update(&vec![SSL3_PAD1; pad_len]);
    let inner = ctx.finish();

    let mut outer = alg.start();
    outer.update(master_secret);
    outer.update(&vec![SSL3_PAD2; pad_len]);
    outer.update(&inner);
    outer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hh(version: ProtocolVersion, client_auth: bool) -> HandshakeHash {
        let mut hhb = HandshakeHashBuffer::new();
        if client_auth {
            hhb.set_client_auth_enabled();
        }
        hhb.add_raw(b"hello");
        hhb.start_hash(version, HashAlgorithm::Sha256)
    }

    #[test]
    fn hashes_correctly() {
        let mut hh = hh(ProtocolVersion::TLSv1_2, false);
        hh.update_raw(b"world");
        let h = hh.current_hash();
        assert_eq!(h, HashAlgorithm::Sha256.hash(b"helloworld"));
        assert!(hh.take_handshake_buf().is_none());
    }

    #[test]
    fn legacy_versions_use_md5_and_sha1() {
        let mut hh = hh(ProtocolVersion::TLSv1_0, false);
        hh.update_raw(b"world");
        let mut expect = HashAlgorithm::Md5.hash(b"helloworld");
        expect.extend(HashAlgorithm::Sha1.hash(b"helloworld"));
        assert_eq!(hh.current_hash(), expect);
        assert_eq!(hh.legacy_verify_digest(&[0u8; 48]), expect);
    }

    #[test]
    fn buffers_for_client_auth() {
        let mut hh = hh(ProtocolVersion::TLSv1_2, true);
        hh.update_raw(b"world");
        assert_eq!(hh.take_handshake_buf().unwrap(), b"helloworld");
        assert!(hh.take_handshake_buf().is_none());

        let mut hh = self::hh(ProtocolVersion::TLSv1_2, true);
        hh.abandon_client_auth();
        hh.update_raw(b"world");
        assert!(hh.take_handshake_buf().is_none());
    }

    #[test]
    fn ssl3_finished_depends_on_sender() {
        let hh = hh(ProtocolVersion::SSLv3, false);
        let master = [0x42u8; 48];
        let client = hh.ssl3_hash(&master, SSL3_CLIENT_SENDER);
        let server = hh.ssl3_hash(&master, SSL3_SERVER_SENDER);
        assert_eq!(client.len(), 36);
        assert_ne!(client, server);
        assert_ne!(client, hh.ssl3_hash(&[0x43u8; 48], SSL3_CLIENT_SENDER));
    }
}
