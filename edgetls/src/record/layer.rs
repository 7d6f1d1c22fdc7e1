//! Turns transport bytes into messages and messages into records.

use std::io;
use std::mem;
use std::time::Instant;

use super::block::Block;
use super::half_conn::{CipherSpec, HalfConn};
use super::sizing::RecordSizer;
use super::{read_header, HEADER_SIZE, MAX_PLAINTEXT};
use crate::enums::{AlertDescription, ContentType, HandshakeType, ProtocolVersion};
use crate::error::{Error, InvalidMessage, PeerIncompatible};
use crate::log::{trace, warn};
use crate::msgs::base::Payload;
use crate::msgs::handshake::{HandshakeMessagePayload, HandshakePayload};
use crate::msgs::hsjoiner::HandshakeJoiner;
use crate::msgs::message::{Message, MessagePayload, PlainMessage};
use crate::msgs::sslv2::{self, SSLV2_HEADER_LEN};

/// Failure while reading or writing records: either the transport
/// failed, or the peer broke the protocol.
#[derive(Debug)]
pub(crate) enum LayerError {
    Io(io::Error),
    Tls(Error),
}

impl From<io::Error> for LayerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<Error> for LayerError {
    fn from(e: Error) -> Self {
        Self::Tls(e)
    }
}

impl From<InvalidMessage> for LayerError {
    fn from(e: InvalidMessage) -> Self {
        Self::Tls(e.into())
    }
}

/// The receiving half of a connection.
pub(crate) struct RecordReader {
    half: HalfConn,
    /// Transport bytes not yet parsed into records.
    raw: Block,
    joiner: HandshakeJoiner,
    version_fixed: bool,
    accept_sslv2_hello: bool,
    seen_record: bool,
    /// Application data received but not yet returned to the caller.
    pub(crate) plaintext: Block,
}

impl RecordReader {
    pub(crate) fn new(accept_sslv2_hello: bool) -> Self {
        Self {
            half: HalfConn::new(ProtocolVersion::TLSv1_0),
            raw: Block::new(),
            joiner: HandshakeJoiner::new(),
            version_fixed: false,
            accept_sslv2_hello,
            seen_record: false,
            plaintext: Block::new(),
        }
    }

    /// From now on every record must carry exactly `version`.
    pub(crate) fn fix_version(&mut self, version: ProtocolVersion) {
        self.half.set_version(version);
        self.version_fixed = true;
    }

    pub(crate) fn prepare_cipher_spec(&mut self, spec: CipherSpec) {
        self.half.prepare_cipher_spec(spec);
    }

    pub(crate) fn change_cipher_spec(&mut self) -> Result<(), Error> {
        if !self.joiner.is_empty() {
            return Err(InvalidMessage::UnexpectedMessage("ChangeCipherSpec inside a handshake message").into());
        }
        self.half.change_cipher_spec()
    }

    /// No partial record or handshake message is buffered, so an EOF
    /// here truncates nothing.
    pub(crate) fn at_boundary(&self) -> bool {
        self.raw.is_empty() && self.joiner.is_empty()
    }

    /// Reads until one whole message is available.  `read` is the
    /// transport.
    pub(crate) fn read_message(
        &mut self,
        mut read: impl FnMut(&mut [u8]) -> io::Result<usize>,
    ) -> Result<Message, LayerError> {
        loop {
            if let Some(m) = self.joiner.pop(self.half.version())? {
                return Ok(m);
            }

            if !self.seen_record {
                self.raw.fill(1, &mut read)?;
                if self.raw.bytes()[0] & 0x80 != 0 {
                    return self.read_sslv2_hello(&mut read);
                }
            }

            self.raw.fill(HEADER_SIZE, &mut read)?;
            let header = read_header(self.raw.bytes())?;
            self.check_version(header.version)?;
            self.raw
                .fill(HEADER_SIZE + header.len, &mut read)?;
            self.seen_record = true;

            let mut rec = self.half.pool.get();
            rec.extend(&self.raw.bytes()[HEADER_SIZE..HEADER_SIZE + header.len]);
            self.raw.consume(HEADER_SIZE + header.len);

            let result = self
                .half
                .decrypt(header.typ, &mut rec)
                .and_then(|()| self.process(header.typ, rec.bytes()));
            self.half.pool.put(rec);

            if let Some(m) = result? {
                return Ok(m);
            }
        }
    }

    fn check_version(&self, version: ProtocolVersion) -> Result<(), Error> {
        let ok = match self.version_fixed {
            true => version == self.half.version(),
            false => u16::from(version) >> 8 == 3,
        };

        match ok {
            true => Ok(()),
            false => {
                warn!(
                    "record version {:?} while expecting {:?}",
                    version,
                    self.half.version()
                );
                Err(PeerIncompatible::UnsupportedProtocolVersion(version).into())
            }
        }
    }

    fn process(&mut self, typ: ContentType, plain: &[u8]) -> Result<Option<Message>, Error> {
        if typ == ContentType::Handshake {
            if plain.is_empty() {
                return Err(InvalidMessage::InvalidEmptyPayload.into());
            }
            self.joiner.push(plain);
            return Ok(None);
        }

        if !self.joiner.is_empty() {
            return Err(InvalidMessage::UnexpectedMessage("record interleaved with a handshake message").into());
        }

        if typ != ContentType::ApplicationData && plain.is_empty() {
            return Err(InvalidMessage::InvalidEmptyPayload.into());
        }

        let payload = MessagePayload::new(typ, plain)?;
        let m = Message {
            version: self.half.version(),
            payload,
        };
        trace!("Received {:?}", m.payload.content_type());
        Ok(Some(m))
    }

    fn read_sslv2_hello(
        &mut self,
        mut read: impl FnMut(&mut [u8]) -> io::Result<usize>,
    ) -> Result<Message, LayerError> {
        if !self.accept_sslv2_hello {
            return Err(Error::from(PeerIncompatible::Sslv2HelloDisabled).into());
        }

        self.raw.fill(SSLV2_HEADER_LEN, &mut read)?;
        let len = sslv2::sslv2_record_len(self.raw.bytes()).ok_or(InvalidMessage::InvalidSslv2Hello)?;
        self.raw
            .fill(SSLV2_HEADER_LEN + len, &mut read)?;
        let body = self.raw.bytes()[SSLV2_HEADER_LEN..SSLV2_HEADER_LEN + len].to_vec();
        self.raw.consume(SSLV2_HEADER_LEN + len);
        self.seen_record = true;

        let hello = sslv2::read_client_hello(&body)?;
        trace!("Received SSLv2 ClientHello {:?}", hello);
        Ok(Message {
            version: hello.client_version,
            payload: MessagePayload::Handshake {
                parsed: HandshakeMessagePayload::build(
                    HandshakeType::ClientHello,
                    HandshakePayload::ClientHello(hello),
                ),
                // the raw v2 message is what both sides hash
                encoded: Payload::new(body),
            },
        })
    }
}

/// The sending half of a connection.  Records accumulate in
/// `sendable` until the connection writes them out.
pub(crate) struct RecordWriter {
    half: HalfConn,
    sendable: Vec<u8>,
    sizer: RecordSizer,
    sent_fatal_alert: bool,
}

impl RecordWriter {
    pub(crate) fn new(version: ProtocolVersion, dynamic_record: bool) -> Self {
        Self {
            half: HalfConn::new(version),
            sendable: Vec::new(),
            sizer: RecordSizer::new(dynamic_record),
            sent_fatal_alert: false,
        }
    }

    pub(crate) fn set_version(&mut self, version: ProtocolVersion) {
        self.half.set_version(version);
    }

    pub(crate) fn set_dynamic_record(&mut self, enabled: bool) {
        self.sizer.set_enabled(enabled);
    }

    pub(crate) fn prepare_cipher_spec(&mut self, spec: CipherSpec) {
        self.half.prepare_cipher_spec(spec);
    }

    pub(crate) fn change_cipher_spec(&mut self) -> Result<(), Error> {
        self.half.change_cipher_spec()
    }

    /// Encodes `m`, splitting it into records of at most 16KB.
    pub(crate) fn send_msg(&mut self, m: Message) -> Result<(), Error> {
        let plain = PlainMessage::from(m);
        for chunk in plain.payload.bytes().chunks(MAX_PLAINTEXT) {
            self.half
                .encrypt(plain.typ, chunk, &mut self.sendable)?;
        }
        Ok(())
    }

    /// Encrypts all of `data` as application data records sized by the
    /// dynamic record policy.
    pub(crate) fn send_app_data(&mut self, data: &[u8], now: Instant) -> Result<(), Error> {
        let mut rest = data;
        while !rest.is_empty() {
            let limit = self.sizer.limit(now);
            let (chunk, tail) = rest.split_at(limit.min(rest.len()));
            self.half
                .encrypt(ContentType::ApplicationData, chunk, &mut self.sendable)?;
            self.sizer.sent(chunk.len(), now);
            rest = tail;
        }
        Ok(())
    }

    /// Queues an alert.  Nothing more is sent after a fatal alert.
    pub(crate) fn send_alert(&mut self, desc: AlertDescription) {
        if self.sent_fatal_alert {
            return;
        }

        let m = Message::build_alert(self.half.version(), desc);
        if let MessagePayload::Alert(alert) = &m.payload {
            self.sent_fatal_alert = alert.level == crate::msgs::enums::AlertLevel::Fatal;
        }
        warn!("Sending alert {:?}", desc);
        if let Err(e) = self.send_msg(m) {
            warn!("cannot encrypt alert: {:?}", e);
        }
    }

    pub(crate) fn has_sendable(&self) -> bool {
        !self.sendable.is_empty()
    }

    pub(crate) fn take_sendable(&mut self) -> Vec<u8> {
        mem::take(&mut self.sendable)
    }

    #[cfg(test)]
    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.half.set_seq(seq);
    }
}
