//! Legacy SSLv2-framed ClientHello, as still sent by some old clients
//! that want to reach SSLv3/TLS servers (RFC 5246, appendix E.2).

use crate::enums::{CipherSuite, HandshakeType, ProtocolVersion};
use crate::error::InvalidMessage;
use crate::msgs::codec::{Codec, Reader};
use crate::msgs::enums::Compression;
use crate::msgs::handshake::{ClientHelloPayload, Random, SessionId};

/// The SSLv2 record header is two bytes; the high bit of the first
/// marks a header without padding.
pub(crate) const SSLV2_HEADER_LEN: usize = 2;

/// Returns the body length if `header` starts an SSLv2-framed record.
pub(crate) fn sslv2_record_len(header: &[u8]) -> Option<usize> {
    match header {
        [b0, b1, ..] if b0 & 0x80 != 0 => {
            Some((usize::from(b0 & 0x7f) << 8) | usize::from(*b1))
        }
        _ => None,
    }
}

/// Converts the body of an SSLv2 CLIENT-HELLO into the equivalent TLS
/// ClientHello.  The caller hashes the raw body into the transcript.
pub(crate) fn read_client_hello(body: &[u8]) -> Result<ClientHelloPayload, InvalidMessage> {
    let mut r = Reader::init(body);

    if HandshakeType::read(&mut r)? != HandshakeType::ClientHello {
        return Err(InvalidMessage::InvalidSslv2Hello);
    }

    let client_version = ProtocolVersion::read(&mut r)?;
    let cipher_spec_len = usize::from(u16::read(&mut r)?);
    let session_id_len = usize::from(u16::read(&mut r)?);
    let challenge_len = usize::from(u16::read(&mut r)?);

    if cipher_spec_len % 3 != 0 || session_id_len > 32 || !(16..=32).contains(&challenge_len) {
        return Err(InvalidMessage::InvalidSslv2Hello);
    }

    let specs = r
        .take(cipher_spec_len)
        .ok_or(InvalidMessage::MissingData("V2CipherSpec"))?;
    let session_id = r
        .take(session_id_len)
        .ok_or(InvalidMessage::MissingData("SessionID"))?;
    let challenge = r
        .take(challenge_len)
        .ok_or(InvalidMessage::MissingData("challenge"))?;
    r.expect_empty("Sslv2ClientHello")?;

    // SSLv2-only kinds have a non-zero first byte; TLS suites are 0x00XXYY
    let cipher_suites = specs
        .chunks_exact(3)
        .filter(|spec| spec[0] == 0)
        .map(|spec| CipherSuite::from(u16::from_be_bytes([spec[1], spec[2]])))
        .collect();

    let mut random = [0u8; 32];
    random[32 - challenge_len..].copy_from_slice(challenge);

    Ok(ClientHelloPayload {
        client_version,
        random: Random(random),
        session_id: SessionId::new(session_id),
        cipher_suites,
        compression_methods: vec![Compression::Null],
        extensions: Vec::new(),
    })
}
