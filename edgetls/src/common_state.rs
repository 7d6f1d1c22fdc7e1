use std::net::IpAddr;
use std::time::{Duration, Instant};

use pki_types::CertificateDer;
use zeroize::Zeroizing;

use crate::enums::{CipherSuite, HandshakeType, ProtocolVersion};
use crate::error::Error;
use crate::grade::Grade;
use crate::hash_hs::HandshakeHash;
use crate::ja3::Ja3;
use crate::key_log::KeyLog;
use crate::key_schedule::ConnectionSecrets;
use crate::log::{debug, trace};
use crate::msgs::handshake::{HandshakeMessagePayload, HandshakePayload};
use crate::msgs::message::{Message, MessagePayload};
use crate::record::layer::{RecordReader, RecordWriter};
use crate::suites::SupportedCipherSuite;

/// Which end of a connection this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// A client initiates the connection.
    Client,
    /// A server waits for a client to connect.
    Server,
}

/// Connection facts gathered by the handshake, shared by both sides.
pub(crate) struct CommonState {
    pub(crate) version: Option<ProtocolVersion>,
    pub(crate) suite: Option<&'static SupportedCipherSuite>,
    pub(crate) did_resume: bool,
    pub(crate) alpn_protocol: Option<Vec<u8>>,
    pub(crate) server_name: Option<String>,
    pub(crate) peer_certificates: Vec<CertificateDer<'static>>,
    pub(crate) ocsp_response: Option<Vec<u8>>,
    pub(crate) ja3: Option<Ja3>,
    pub(crate) grade: Grade,
    pub(crate) client_authenticated: bool,
    /// The local address a server connection was accepted on.
    pub(crate) vip: Option<IpAddr>,
    pub(crate) client_random: Option<[u8; 32]>,
    pub(crate) server_random: Option<[u8; 32]>,
    master_secret: Option<Zeroizing<[u8; 48]>>,
    started: Instant,
    pub(crate) handshake_duration: Option<Duration>,
}

impl CommonState {
    pub(crate) fn new() -> Self {
        Self {
            version: None,
            suite: None,
            did_resume: false,
            alpn_protocol: None,
            server_name: None,
            peer_certificates: Vec::new(),
            ocsp_response: None,
            ja3: None,
            grade: Grade::default(),
            client_authenticated: false,
            vip: None,
            client_random: None,
            server_random: None,
            master_secret: None,
            started: Instant::now(),
            handshake_duration: None,
        }
    }

    pub(crate) fn is_handshaking(&self) -> bool {
        self.handshake_duration.is_none()
    }

    /// Records the outcome of a finished handshake and writes the key
    /// log line.
    pub(crate) fn complete_handshake(&mut self, secrets: &ConnectionSecrets, key_log: &dyn KeyLog) {
        self.suite = Some(secrets.suite());
        self.client_random = Some(secrets.randoms.client);
        self.server_random = Some(secrets.randoms.server);
        self.master_secret = Some(Zeroizing::new(*secrets.master_secret()));
        self.handshake_duration = Some(self.started.elapsed());

        key_log.log(&secrets.randoms.client, secrets.master_secret());

        debug!(
            "handshake complete: {:?} {:?} resumed={} in {:?}",
            self.version,
            self.suite.map(|s| s.suite),
            self.did_resume,
            self.handshake_duration
        );
    }

    pub(crate) fn snapshot(&self) -> ConnectionState {
        ConnectionState {
            version: self.version,
            cipher_suite: self.suite.map(|s| s.suite),
            handshake_complete: !self.is_handshaking(),
            did_resume: self.did_resume,
            negotiated_protocol: self.alpn_protocol.clone(),
            server_name: self.server_name.clone(),
            peer_certificates: self.peer_certificates.clone(),
            ocsp_response: self.ocsp_response.clone(),
            ja3: self.ja3.clone(),
            grade: self.grade,
            client_authenticated: self.client_authenticated,
            client_random: self.client_random,
            server_random: self.server_random,
            master_secret: self.master_secret.as_deref().copied(),
            handshake_duration: self.handshake_duration,
        }
    }
}

/// A snapshot of what a connection negotiated.
#[derive(Clone, Debug, Default)]
pub struct ConnectionState {
    /// The protocol version, once the hellos are exchanged.
    pub version: Option<ProtocolVersion>,
    /// The cipher suite, once the hellos are exchanged.
    pub cipher_suite: Option<CipherSuite>,
    /// Both Finished messages have been exchanged.
    pub handshake_complete: bool,
    /// The handshake was abbreviated from a session id or ticket.
    pub did_resume: bool,
    /// The ALPN or NPN protocol agreed on.
    pub negotiated_protocol: Option<Vec<u8>>,
    /// The SNI the client sent (server side), or the name the client
    /// verified (client side).
    pub server_name: Option<String>,
    /// The peer's certificate chain, end-entity first.
    pub peer_certificates: Vec<CertificateDer<'static>>,
    /// The OCSP response stapled by (client side) or to (server side)
    /// the server certificate.
    pub ocsp_response: Option<Vec<u8>>,
    /// The fingerprint of the client's hello.  Server side only.
    pub ja3: Option<Ja3>,
    /// The grade the server enforced on this connection.
    pub grade: Grade,
    /// The client presented a certificate that was accepted.
    pub client_authenticated: bool,
    /// `ClientHello.random`.
    pub client_random: Option<[u8; 32]>,
    /// `ServerHello.random`.
    pub server_random: Option<[u8; 32]>,
    /// The master secret.  Treat it like a private key.
    pub master_secret: Option<[u8; 48]>,
    /// Time from connection setup to the end of the handshake.
    pub handshake_duration: Option<Duration>,
}

/// Everything a handshake state may touch while handling a message.
pub(crate) struct Context<'a> {
    pub(crate) common: &'a mut CommonState,
    pub(crate) reader: &'a mut RecordReader,
    pub(crate) writer: &'a mut RecordWriter,
}

impl Context<'_> {
    pub(crate) fn send_msg(&mut self, m: Message) -> Result<(), Error> {
        trace!("Sending {:?}", m);
        self.writer.send_msg(m)
    }

    /// Sends a handshake message, adding it to the transcript first.
    pub(crate) fn emit(
        &mut self,
        transcript: &mut HandshakeHash,
        typ: HandshakeType,
        payload: HandshakePayload,
    ) -> Result<(), Error> {
        let m = Message {
            version: self.version(),
            payload: MessagePayload::handshake(HandshakeMessagePayload::build(typ, payload)),
        };
        transcript.add_message(&m);
        self.send_msg(m)
    }

    /// Sends ChangeCipherSpec and starts encrypting with the pending
    /// cipher.
    pub(crate) fn emit_ccs(&mut self) -> Result<(), Error> {
        self.send_msg(Message::build_ccs(self.version()))?;
        self.writer.change_cipher_spec()
    }

    pub(crate) fn version(&self) -> ProtocolVersion {
        self.common
            .version
            .unwrap_or(ProtocolVersion::TLSv1_0)
    }

    /// Fixes the version for both directions once it is negotiated.
    pub(crate) fn set_version(&mut self, version: ProtocolVersion) {
        self.common.version = Some(version);
        self.reader.fix_version(version);
        self.writer.set_version(version);
    }
}

pub(crate) trait State: Send {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error>;

    /// True once the handshake is over and only application data
    /// flows.
    fn is_traffic(&self) -> bool {
        false
    }
}

/// The state after a successful handshake.  Post-handshake messages
/// are dealt with by the connection itself.
pub(crate) struct ExpectTraffic;

impl State for ExpectTraffic {
    fn handle(self: Box<Self>, _cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        Err(crate::check::inappropriate_message(
            &m.payload,
            &[crate::enums::ContentType::ApplicationData],
        ))
    }

    fn is_traffic(&self) -> bool {
        true
    }
}
