//! Record framing, protection and sizing.

use crate::enums::{ContentType, ProtocolVersion};
use crate::error::{Error, InvalidMessage};

pub(crate) mod block;
pub(crate) mod half_conn;
pub(crate) mod layer;
pub(crate) mod sizing;

/// `type(1) | version(2) | length(2)`
pub(crate) const HEADER_SIZE: usize = 1 + 2 + 2;

/// Largest plaintext fragment a record may carry.
pub(crate) const MAX_PLAINTEXT: usize = 16384;

/// Largest protected fragment a peer may send us.
pub(crate) const MAX_CIPHERTEXT: usize = MAX_PLAINTEXT + 2048;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RecordHeader {
    pub(crate) typ: ContentType,
    pub(crate) version: ProtocolVersion,
    pub(crate) len: usize,
}

/// Parses the first [`HEADER_SIZE`] bytes of `bytes` as a record
/// header.
pub(crate) fn read_header(bytes: &[u8]) -> Result<RecordHeader, Error> {
    let header = bytes
        .get(..HEADER_SIZE)
        .ok_or(InvalidMessage::MessageTooShort)?;

    let typ = ContentType::from(header[0]);
    if let ContentType::Unknown(_) = typ {
        return Err(InvalidMessage::InvalidContentType.into());
    }

    let version = ProtocolVersion::from(u16::from_be_bytes([header[1], header[2]]));
    let len = usize::from(u16::from_be_bytes([header[3], header[4]]));
    if len > MAX_CIPHERTEXT {
        return Err(Error::PeerSentOversizedRecord);
    }

    Ok(RecordHeader { typ, version, len })
}

pub(crate) fn encode_header(typ: ContentType, version: ProtocolVersion, len: usize, out: &mut Vec<u8>) {
    out.push(u8::from(typ));
    out.extend_from_slice(&u16::from(version).to_be_bytes());
    out.extend_from_slice(&(len as u16).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut buf = Vec::new();
        encode_header(
            ContentType::Handshake,
            ProtocolVersion::TLSv1_0,
            300,
            &mut buf,
        );
        assert_eq!(buf, [0x16, 0x03, 0x01, 0x01, 0x2c]);
        assert_eq!(
            read_header(&buf).unwrap(),
            RecordHeader {
                typ: ContentType::Handshake,
                version: ProtocolVersion::TLSv1_0,
                len: 300
            }
        );
    }

    #[test]
    fn rejects_oversized_and_unknown() {
        assert_eq!(
            read_header(&[0x17, 3, 3, 0x48, 0x01]).unwrap_err(),
            Error::PeerSentOversizedRecord
        );
        assert!(read_header(&[0x17, 3, 3, 0x48, 0x00]).is_ok());
        assert_eq!(
            read_header(&[0x99, 3, 3, 0, 1]).unwrap_err(),
            Error::InvalidMessage(InvalidMessage::InvalidContentType)
        );
        assert!(read_header(&[0x17, 3, 3]).is_err());
    }
}
