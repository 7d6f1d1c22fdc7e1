use crate::enums::{ContentType, HandshakeType};
use crate::error::Error;
use crate::log::warn;
use crate::msgs::handshake::HandshakeMessagePayload;
use crate::msgs::message::{Message, MessagePayload};

/// For a Message $m, and a HandshakePayload enum member $payload_type,
/// return Ok(payload) if $m is both a handshake message and one that
/// has the given $payload_type.  If not, return Err(edgetls::Error) quoting
/// $handshake_type as the expected handshake type.
macro_rules! require_handshake_msg(
  ( $m:expr, $handshake_type:path, $payload_type:path ) => (
    match &$m.payload {
        MessagePayload::Handshake { parsed, .. } => match &parsed.payload {
            $payload_type(hm) => Ok(hm),
            _ => Err(crate::check::inappropriate_handshake_message(
                     parsed, &[$handshake_type]))
        }
        payload => Err(Error::InappropriateMessage {
                 expect_types: vec![ ContentType::Handshake ],
                 got_type: payload.content_type()})
    }
  )
);

/// Like require_handshake_msg, but moves the payload out of $m.
macro_rules! require_handshake_msg_move(
  ( $m:expr, $handshake_type:path, $payload_type:path ) => (
    match $m.payload {
        MessagePayload::Handshake { parsed, .. } => match parsed.payload {
            $payload_type(hm) => Ok(hm),
            _ => Err(Error::InappropriateHandshakeMessage {
                     expect_types: vec![ $handshake_type ],
                     got_type: parsed.typ})
        }
        payload => Err(Error::InappropriateMessage {
                 expect_types: vec![ ContentType::Handshake ],
                 got_type: payload.content_type()})
    }
  )
);

pub(crate) fn inappropriate_message(payload: &MessagePayload, content_types: &[ContentType]) -> Error {
    warn!(
        "Received a {:?} message while expecting {:?}",
        payload.content_type(),
        content_types
    );
    Error::InappropriateMessage {
        expect_types: content_types.to_vec(),
        got_type: payload.content_type(),
    }
}

pub(crate) fn inappropriate_handshake_message(
    hsp: &HandshakeMessagePayload,
    handshake_types: &[HandshakeType],
) -> Error {
    warn!(
        "Received a {:?} handshake message while expecting {:?}",
        hsp.typ, handshake_types
    );
    Error::InappropriateHandshakeMessage {
        expect_types: handshake_types.to_vec(),
        got_type: hsp.typ,
    }
}

/// The error for any message arriving in a state that wants only
/// `handshake_types`.
pub(crate) fn unexpected(m: &Message, handshake_types: &[HandshakeType]) -> Error {
    match &m.payload {
        MessagePayload::Handshake { parsed, .. } => {
            inappropriate_handshake_message(parsed, handshake_types)
        }
        payload => inappropriate_message(payload, &[ContentType::Handshake]),
    }
}
