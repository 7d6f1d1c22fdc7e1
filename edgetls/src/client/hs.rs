use std::net::IpAddr;
use std::sync::Arc;

use super::client_conn::ClientConfig;
use super::tls12::{self, ExpectCcs, ExpectCertificate, ExpectNewTicket};
use crate::common_state::{Context, Side, State};
use crate::crypto::kx::SUPPORTED_GROUPS;
use crate::crypto::verify::VERIFY_SCHEMES;
use crate::enums::{CipherSuite, ContentType, HandshakeType, ProtocolVersion};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::HandshakeHashBuffer;
use crate::key_schedule::{ConnectionRandoms, ConnectionSecrets};
use crate::log::{debug, trace};
use crate::msgs::base::{Payload, PayloadU8};
use crate::msgs::enums::{Compression, ECPointFormat, ExtensionType};
use crate::msgs::handshake::{
    CertificateStatusRequest, ClientExtension, ClientHelloPayload, ClientSessionTicket,
    HandshakeMessagePayload, HandshakePayload, Random, ServerHelloPayload, ServerName, SessionId,
};
use crate::msgs::message::{Message, MessagePayload};
use crate::msgs::persist::ClientSessionValue;
use crate::suites::{find_suite, SupportedCipherSuite};

/// What the ServerHello settled, carried through the rest of the
/// handshake.
pub(super) struct Negotiated {
    pub(super) config: Arc<ClientConfig>,
    pub(super) version: ProtocolVersion,
    pub(super) suite: &'static SupportedCipherSuite,
    pub(super) randoms: ConnectionRandoms,
    /// The session id the server assigned.
    pub(super) session_id: SessionId,
    /// The server will send NewSessionTicket.
    pub(super) ticket_ack: bool,
    /// The server may send CertificateStatus.
    pub(super) status_ack: bool,
    /// The protocol to announce in NextProtocol, when NPN was agreed.
    pub(super) npn_protocol: Option<Vec<u8>>,
}

impl Negotiated {
    /// The key sessions are cached under.
    pub(super) fn cache_key(&self) -> Option<&str> {
        self.config.server_name.as_deref()
    }
}

/// Sends the ClientHello and returns the state waiting for the reply.
pub(crate) fn start_handshake(config: Arc<ClientConfig>, cx: &mut Context<'_>) -> Result<Box<dyn State>, Error> {
    start_handshake_adjusted(config, cx, |_| {})
}

/// As [`start_handshake`], letting `adjust` edit the ClientHello before
/// it is sent.
pub(crate) fn start_handshake_adjusted(
    config: Arc<ClientConfig>,
    cx: &mut Context<'_>,
    adjust: impl FnOnce(&mut ClientHelloPayload),
) -> Result<Box<dyn State>, Error> {
    let resuming = config
        .server_name
        .as_deref()
        .and_then(|name| config.session_cache.get(name))
        .filter(|session| {
            session.state.version.at_least(config.min_version)
                && config.max_version.at_least(session.state.version)
        });
    if let Some(resuming) = &resuming {
        debug!("resuming session {:?}", resuming.state);
    }

    let random = Random::new()?;
    let session_id = match &resuming {
        // A random id lets us recognise the server accepting the ticket.
        Some(session) if !session.ticket.is_empty() && session.session_id.is_empty() => SessionId::random()?,
        Some(session) => session.session_id,
        None => SessionId::empty(),
    };

    let max = config.max_version;
    let mut cipher_suites: Vec<CipherSuite> = config
        .cipher_suites
        .suites()
        .iter()
        .filter(|s| s.usable_for_version(max))
        .map(|s| s.suite)
        .collect();
    let offer_ecdhe = config
        .cipher_suites
        .suites()
        .iter()
        .any(|s| s.is_ecdhe());

    let mut extensions = Vec::new();
    if let Some(name) = &config.server_name {
        if name.parse::<IpAddr>().is_err() {
            extensions.push(ClientExtension::ServerName(vec![ServerName::host_name(name)]));
        }
    }
    if offer_ecdhe {
        extensions.push(ClientExtension::NamedGroups(SUPPORTED_GROUPS.to_vec()));
        extensions.push(ClientExtension::EcPointFormats(vec![
            ECPointFormat::Uncompressed,
        ]));
    }
    if max.at_least(ProtocolVersion::TLSv1_2) {
        extensions.push(ClientExtension::SignatureAlgorithms(VERIFY_SCHEMES.to_vec()));
    }
    if config.enable_tickets {
        let ticket = match &resuming {
            Some(session) if !session.ticket.is_empty() => {
                ClientSessionTicket::Offer(Payload::new(session.ticket.clone()))
            }
            _ => ClientSessionTicket::Request,
        };
        extensions.push(ClientExtension::SessionTicket(ticket));
    }
    if !config.alpn_protocols.is_empty() {
        match config.enable_npn {
            true => extensions.push(ClientExtension::NextProtocolNegotiation),
            false => extensions.push(ClientExtension::Protocols(
                config
                    .alpn_protocols
                    .iter()
                    .map(|p| PayloadU8::new(p.clone()))
                    .collect(),
            )),
        }
    }
    if config.request_ocsp {
        extensions.push(ClientExtension::CertificateStatusRequest(
            CertificateStatusRequest::build_ocsp(),
        ));
    }
    match max {
        ProtocolVersion::SSLv3 => {
            cipher_suites.push(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);
        }
        _ => extensions.push(ClientExtension::RenegotiationInfo(PayloadU8::empty())),
    }

    let mut hello = ClientHelloPayload {
        client_version: max,
        random,
        session_id,
        cipher_suites,
        compression_methods: vec![Compression::Null],
        extensions,
    };
    adjust(&mut hello);

    let offered: Vec<ExtensionType> = hello
        .extensions
        .iter()
        .map(|ext| ext.ext_type())
        .collect();
    trace!("Sending ClientHello {:?}", hello);

    let ch = Message {
        version: ProtocolVersion::TLSv1_0,
        payload: MessagePayload::handshake(HandshakeMessagePayload::build(
            HandshakeType::ClientHello,
            HandshakePayload::ClientHello(hello.clone()),
        )),
    };

    let mut transcript = HandshakeHashBuffer::new();
    if config.client_auth_cert.is_some() {
        transcript.set_client_auth_enabled();
    }
    transcript.add_message(&ch);
    cx.send_msg(ch)?;
    cx.common.server_name = config.server_name.clone();

    Ok(Box::new(ExpectServerHello {
        config,
        transcript,
        hello,
        offered,
        resuming,
    }))
}

/// Starts a handshake whose ClientHello goes out in SSLv2 framing, as
/// old clients send it.  Returns the first state and the record to
/// write; the transcript starts with the raw v2 message.
#[cfg(test)]
pub(crate) fn start_sslv2_handshake(config: Arc<ClientConfig>) -> Result<(Box<dyn State>, Vec<u8>), Error> {
    use crate::msgs::sslv2::{tests::encode_sslv2_hello, SSLV2_HEADER_LEN};

    let random = Random::new()?;
    let cipher_suites: Vec<CipherSuite> = config
        .cipher_suites
        .suites()
        .iter()
        .map(|s| s.suite)
        .collect();
    // a 32-byte challenge is the client random as it stands
    let record = encode_sslv2_hello(config.max_version, &cipher_suites, &random.0);

    let mut transcript = HandshakeHashBuffer::new();
    transcript.add_raw(&record[SSLV2_HEADER_LEN..]);

    let hello = ClientHelloPayload {
        client_version: config.max_version,
        random,
        session_id: SessionId::empty(),
        cipher_suites,
        compression_methods: vec![Compression::Null],
        extensions: Vec::new(),
    };

    let state = Box::new(ExpectServerHello {
        config,
        transcript,
        hello,
        offered: Vec::new(),
        resuming: None,
    });
    Ok((state, record))
}

struct ExpectServerHello {
    config: Arc<ClientConfig>,
    transcript: HandshakeHashBuffer,
    hello: ClientHelloPayload,
    offered: Vec<ExtensionType>,
    resuming: Option<ClientSessionValue>,
}

impl State for ExpectServerHello {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let server_hello =
            require_handshake_msg!(m, HandshakeType::ServerHello, HandshakePayload::ServerHello)?;
        trace!("We got ServerHello {:?}", server_hello);
        (*self).handle_server_hello(cx, server_hello, &m)
    }
}

impl ExpectServerHello {
    fn handle_server_hello(
        mut self,
        cx: &mut Context<'_>,
        server_hello: &ServerHelloPayload,
        m: &Message,
    ) -> Result<Box<dyn State>, Error> {
        let version = server_hello.server_version;
        if !version.is_supported()
            || !version.at_least(self.config.min_version)
            || !self.config.max_version.at_least(version)
        {
            return Err(PeerIncompatible::UnsupportedProtocolVersion(version).into());
        }
        cx.set_version(version);

        if server_hello.compression_method != Compression::Null {
            return Err(PeerMisbehaved::SelectedUnofferedCompression.into());
        }

        if !self
            .hello
            .cipher_suites
            .contains(&server_hello.cipher_suite)
        {
            return Err(PeerMisbehaved::SelectedUnofferedCipherSuite.into());
        }
        let suite = find_suite(server_hello.cipher_suite).ok_or(PeerMisbehaved::SelectedUnofferedCipherSuite)?;
        if !suite.usable_for_version(version) {
            return Err(PeerMisbehaved::SelectedUnusableCipherSuiteForVersion.into());
        }
        debug!("Using ciphersuite {:?} with {:?}", suite, version);

        self.check_extensions(server_hello)?;

        if let Some(info) = server_hello.renegotiation_info() {
            if !info.0.is_empty() {
                return Err(PeerMisbehaved::InvalidRenegotiationInfo.into());
            }
        }

        if let Some(proto) = server_hello.alpn_protocol() {
            if !self
                .config
                .alpn_protocols
                .iter()
                .any(|ours| ours == proto)
            {
                return Err(PeerMisbehaved::SelectedUnofferedApplicationProtocol.into());
            }
            cx.common.alpn_protocol = Some(proto.to_vec());
            debug!("ALPN protocol is {:?}", proto);
        }

        // NPN: the first of ours the server lists, else our favourite.
        let npn_protocol = server_hello.next_protocols().map(|theirs| {
            self.config
                .alpn_protocols
                .iter()
                .find(|ours| theirs.iter().any(|p| p.0 == **ours))
                .or_else(|| self.config.alpn_protocols.first())
                .cloned()
                .unwrap_or_default()
        });
        if let Some(proto) = &npn_protocol {
            cx.common.alpn_protocol = Some(proto.clone());
        }

        let neg = Negotiated {
            config: self.config.clone(),
            version,
            suite,
            randoms: ConnectionRandoms::new(self.hello.random.0, server_hello.random.0),
            session_id: server_hello.session_id,
            ticket_ack: server_hello.ticket_ack(),
            status_ack: server_hello.status_ack(),
            npn_protocol,
        };

        self.transcript.add_message(m);

        // The server echoing our session id means it accepted the
        // cached session.
        let resumed = self.resuming.take().filter(|_| {
            !self.hello.session_id.is_empty() && self.hello.session_id == server_hello.session_id
        });

        if let Some(session) = resumed {
            if session.state.version != version {
                return Err(PeerMisbehaved::ResumedWithVariedVersion.into());
            }
            if session.state.cipher_suite != suite.suite {
                return Err(PeerMisbehaved::ResumedWithVariedCipherSuite.into());
            }
            let master_secret = session
                .state
                .master_secret()
                .ok_or_else(|| Error::General("cached session has a bad master secret".into()))?;

            debug!("Server agreed to resume");
            let mut transcript = self
                .transcript
                .start_hash(version, suite.prf_hash());
            transcript.abandon_client_auth();

            let secrets = ConnectionSecrets::new_resume(neg.randoms, version, suite, &master_secret);
            let (read, write) = secrets.make_cipher_specs(Side::Client)?;
            cx.reader.prepare_cipher_spec(read);
            cx.writer.prepare_cipher_spec(write);

            cx.common.did_resume = true;
            cx.common.peer_certificates = session.state.certificates;

            let flight = tls12::Flight {
                neg,
                transcript,
                secrets,
                server_cert: cx.common.peer_certificates.clone(),
                ticket: session.ticket,
                resuming: true,
            };
            return match flight.neg.ticket_ack {
                true => Ok(Box::new(ExpectNewTicket(flight))),
                false => Ok(Box::new(ExpectCcs(flight))),
            };
        }

        let transcript = self
            .transcript
            .start_hash(version, suite.prf_hash());
        Ok(Box::new(ExpectCertificate {
            neg,
            transcript,
            client_version: self.hello.client_version,
        }))
    }

    /// Every extension in the ServerHello must answer one we sent.
    fn check_extensions(&self, server_hello: &ServerHelloPayload) -> Result<(), Error> {
        for ext in &server_hello.extensions {
            let typ = ext.ext_type();
            if self.offered.contains(&typ) {
                continue;
            }

            return Err(match typ {
                ExtensionType::SessionTicket => PeerMisbehaved::UnsolicitedSessionTicket,
                ExtensionType::StatusRequest => PeerMisbehaved::UnsolicitedCertificateStatus,
                _ => PeerMisbehaved::UnsolicitedServerHelloExtension,
            }
            .into());
        }
        Ok(())
    }
}

/// HelloRequest after the handshake: the connection refuses
/// renegotiation.
pub(crate) fn refuse_renegotiation(m: &Message) -> Error {
    match &m.payload {
        MessagePayload::Handshake { parsed, .. } if parsed.typ == HandshakeType::HelloRequest => {
            PeerMisbehaved::RenegotiationAttempted.into()
        }
        MessagePayload::Handshake { parsed, .. } => {
            crate::check::inappropriate_handshake_message(parsed, &[HandshakeType::HelloRequest])
        }
        payload => crate::check::inappropriate_message(payload, &[ContentType::ApplicationData]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake(typ: HandshakeType, payload: HandshakePayload) -> Message {
        Message {
            version: ProtocolVersion::TLSv1_2,
            payload: MessagePayload::handshake(HandshakeMessagePayload::build(typ, payload)),
        }
    }

    #[test]
    fn hello_request_is_refused() {
        let m = handshake(HandshakeType::HelloRequest, HandshakePayload::HelloRequest);
        assert_eq!(
            refuse_renegotiation(&m),
            Error::PeerMisbehaved(PeerMisbehaved::RenegotiationAttempted)
        );
    }

    #[test]
    fn late_handshake_messages_are_unexpected() {
        let m = handshake(
            HandshakeType::Finished,
            HandshakePayload::Finished(Payload::new(vec![0u8; 12])),
        );
        assert_eq!(
            refuse_renegotiation(&m),
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeType::HelloRequest],
                got_type: HandshakeType::Finished,
            }
        );
    }
}
