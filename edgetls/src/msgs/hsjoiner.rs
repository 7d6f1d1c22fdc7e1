use crate::enums::ProtocolVersion;
use crate::error::InvalidMessage;
use crate::msgs::base::Payload;
use crate::msgs::codec;
use crate::msgs::handshake::{HandshakeMessagePayload, MAX_HANDSHAKE_SIZE};
use crate::msgs::message::{Message, MessagePayload};

const HEADER_SIZE: usize = 1 + 3;

/// Reassembles handshake messages from the plaintext of handshake
/// records.  A record may carry several messages and a message may
/// span several records.
#[derive(Default)]
pub(crate) struct HandshakeJoiner {
    buf: Vec<u8>,
}

impl HandshakeJoiner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// True when no partial message is buffered.
    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn push(&mut self, plaintext: &[u8]) {
        self.buf.extend_from_slice(plaintext);
    }

    /// Takes the next complete message, if one is buffered.
    ///
    /// `version` selects the body format of the few messages that
    /// differ before TLS 1.2.
    pub(crate) fn pop(&mut self, version: ProtocolVersion) -> Result<Option<Message>, InvalidMessage> {
        let len = match self.complete_len()? {
            Some(len) => len,
            None => return Ok(None),
        };

        let encoded: Vec<u8> = self.buf.drain(..len).collect();
        let mut r = codec::Reader::init(&encoded);
        let parsed = HandshakeMessagePayload::read_version(&mut r, version)?;

        Ok(Some(Message {
            version,
            payload: MessagePayload::Handshake {
                parsed,
                encoded: Payload::new(encoded),
            },
        }))
    }

    fn complete_len(&self) -> Result<Option<usize>, InvalidMessage> {
        let header = match self.buf.get(..HEADER_SIZE) {
            Some(header) => header,
            None => return Ok(None),
        };

        let body_len = u32::from_be_bytes([0, header[1], header[2], header[3]]);
        if body_len > MAX_HANDSHAKE_SIZE {
            return Err(InvalidMessage::HandshakePayloadTooLarge);
        }

        let total = HEADER_SIZE + body_len as usize;
        Ok(match self.buf.len() >= total {
            true => Some(total),
            false => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::HandshakeType;

    #[test]
    fn split_and_joined_messages() {
        let mut hj = HandshakeJoiner::new();
        // HelloRequest, then the first half of a ServerHelloDone
        hj.push(&[0x00, 0, 0, 0, 0x0e, 0]);
        let first = hj
            .pop(ProtocolVersion::TLSv1_2)
            .unwrap()
            .unwrap();
        assert!(first.is_handshake_type(HandshakeType::HelloRequest));
        assert!(hj
            .pop(ProtocolVersion::TLSv1_2)
            .unwrap()
            .is_none());
        assert!(!hj.is_empty());

        hj.push(&[0, 0]);
        let second = hj
            .pop(ProtocolVersion::TLSv1_2)
            .unwrap()
            .unwrap();
        assert!(second.is_handshake_type(HandshakeType::ServerHelloDone));
        assert!(hj.is_empty());
    }

    #[test]
    fn rejects_oversized_message() {
        let mut hj = HandshakeJoiner::new();
        hj.push(&[0x0b, 0x01, 0x00, 0x00]);
        assert_eq!(
            hj.pop(ProtocolVersion::TLSv1_2).unwrap_err(),
            InvalidMessage::HandshakePayloadTooLarge
        );
    }
}
