use pki_types::CertificateDer;
use subtle::ConstantTimeEq;

use super::hs::Negotiated;
use crate::common_state::{Context, ExpectTraffic, Side, State};
use crate::crypto::kx::{rsa_encrypt_premaster, KeyExchange, SUPPORTED_GROUPS};
use crate::crypto::verify::{PeerPublicKey, VERIFY_SCHEMES};
use crate::enums::{ContentType, HandshakeType, ProtocolVersion};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::HandshakeHash;
use crate::key_schedule::ConnectionSecrets;
use crate::log::{debug, trace, warn};
use crate::msgs::base::{Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::{Codec, Reader};
use crate::msgs::enums::NamedGroup;
use crate::msgs::handshake::{
    CertificateRequestPayload, DigitallySignedStruct, EcdheServerKeyExchange, HandshakePayload,
    NextProtocolPayload,
};
use crate::msgs::message::{Message, MessagePayload};
use crate::msgs::persist::{ClientSessionValue, SessionState};
use crate::verify;

pub(super) struct ExpectCertificate {
    pub(super) neg: Negotiated,
    pub(super) transcript: HandshakeHash,
    /// The version in our ClientHello, which RSA key transport repeats.
    pub(super) client_version: ProtocolVersion,
}

impl State for ExpectCertificate {
    fn handle(mut self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        self.transcript.add_message(&m);
        let chain = require_handshake_msg_move!(m, HandshakeType::Certificate, HandshakePayload::Certificate)?;
        if chain.is_empty() {
            return Err(Error::NoCertificatesPresented);
        }

        match self.neg.config.insecure_skip_verify {
            true => warn!("skipping verification of the server certificate"),
            false => {
                let now = self.neg.config.current_time()?;
                verify::verify_server_chain(
                    &self.neg.config.roots,
                    &chain,
                    self.neg.config.server_name.as_deref(),
                    now,
                )?;
                trace!("server certificate chain verified");
            }
        }

        let server_key = PeerPublicKey::from_cert(&chain[0])?;
        cx.common.peer_certificates = chain.clone();

        let flight = ServerFlight {
            neg: self.neg,
            transcript: self.transcript,
            client_version: self.client_version,
            server_cert: chain,
            server_key,
            server_kx: None,
            cert_req: None,
        };
        Ok(match flight.neg.status_ack {
            true => Box::new(ExpectCertificateStatus(flight)),
            false => flight.after_status(),
        })
    }
}

/// What the server sent between its Certificate and ServerHelloDone.
struct ServerFlight {
    neg: Negotiated,
    transcript: HandshakeHash,
    client_version: ProtocolVersion,
    server_cert: Vec<CertificateDer<'static>>,
    server_key: PeerPublicKey,
    /// The group and public key from ServerKeyExchange.
    server_kx: Option<(NamedGroup, Vec<u8>)>,
    cert_req: Option<CertificateRequestPayload>,
}

impl ServerFlight {
    fn after_status(self) -> Box<dyn State> {
        match self.neg.suite.is_ecdhe() {
            true => Box::new(ExpectServerKx(self)),
            false => Box::new(ExpectCertificateRequest(self)),
        }
    }
}

/// The server acknowledged status_request, but the CertificateStatus
/// message itself is optional.
struct ExpectCertificateStatus(ServerFlight);

impl State for ExpectCertificateStatus {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let mut flight = self.0;
        if !m.is_handshake_type(HandshakeType::CertificateStatus) {
            return flight.after_status().handle(cx, m);
        }

        flight.transcript.add_message(&m);
        let status = require_handshake_msg_move!(
            m,
            HandshakeType::CertificateStatus,
            HandshakePayload::CertificateStatus
        )?;
        debug!("server stapled OCSP response of {} bytes", status.ocsp_response.0.len());
        cx.common.ocsp_response = Some(status.ocsp_response.0);
        Ok(flight.after_status())
    }
}

struct ExpectServerKx(ServerFlight);

impl State for ExpectServerKx {
    fn handle(self: Box<Self>, _cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let mut flight = self.0;
        let opaque_kx = require_handshake_msg!(
            m,
            HandshakeType::ServerKeyExchange,
            HandshakePayload::ServerKeyExchange
        )?;
        let version = flight.neg.version;
        let skx = EcdheServerKeyExchange::read(&mut Reader::init(opaque_kx.bytes()), version)?;

        let group = skx.params.named_group;
        if !SUPPORTED_GROUPS.contains(&group) {
            return Err(PeerMisbehaved::InvalidKeyShare.into());
        }

        let scheme_ok = match (version.at_least(ProtocolVersion::TLSv1_2), skx.dss.scheme) {
            (true, Some(scheme)) => VERIFY_SCHEMES.contains(&scheme),
            (false, None) => true,
            _ => false,
        };
        if !scheme_ok || flight.server_key.is_ecdsa() != flight.neg.suite.is_ecdsa() {
            return Err(PeerMisbehaved::SignedKxWithWrongAlgorithm.into());
        }

        let mut signed = Vec::new();
        signed.extend(flight.neg.randoms.client);
        signed.extend(flight.neg.randoms.server);
        skx.params.encode(&mut signed);
        flight
            .server_key
            .verify(skx.dss.scheme, &signed, &skx.dss.sig.0)?;
        trace!("ServerKeyExchange signature OK");

        flight.transcript.add_message(&m);
        flight.server_kx = Some((group, skx.params.public.0));
        Ok(Box::new(ExpectCertificateRequest(flight)))
    }
}

struct ExpectCertificateRequest(ServerFlight);

impl State for ExpectCertificateRequest {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let mut flight = self.0;
        if !m.is_handshake_type(HandshakeType::CertificateRequest) {
            return Box::new(ExpectServerDone(flight)).handle(cx, m);
        }

        flight.transcript.add_message(&m);
        let cert_req = require_handshake_msg_move!(
            m,
            HandshakeType::CertificateRequest,
            HandshakePayload::CertificateRequest
        )?;
        debug!("Got CertificateRequest {:?}", cert_req);
        flight.cert_req = Some(cert_req);
        Ok(Box::new(ExpectServerDone(flight)))
    }
}

struct ExpectServerDone(ServerFlight);

impl State for ExpectServerDone {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let flight = self.0;
        if !m.is_handshake_type(HandshakeType::ServerHelloDone) {
            return Err(crate::check::unexpected(&m, &[HandshakeType::ServerHelloDone]));
        }

        let ServerFlight {
            neg,
            mut transcript,
            client_version,
            server_cert,
            server_key,
            server_kx,
            cert_req,
        } = flight;
        transcript.add_message(&m);
        let version = neg.version;

        // -- Certificate --
        let client_cert = cert_req
            .as_ref()
            .and_then(|_| neg.config.client_auth_cert.clone());
        if cert_req.is_some() {
            match &client_cert {
                Some(ck) => emit_certificate(cx, &mut transcript, ck.cert.clone())?,
                // SSLv3 clients say nothing.
                None if version == ProtocolVersion::SSLv3 => {}
                None => emit_certificate(cx, &mut transcript, Vec::new())?,
            }
        }
        if client_cert.is_none() {
            transcript.abandon_client_auth();
        }

        // -- ClientKeyExchange --
        let mut body = Vec::new();
        let premaster = match server_kx {
            Some((group, peer)) => {
                let kx = KeyExchange::start(group)?;
                PayloadU8::new(kx.pub_key.clone()).encode(&mut body);
                kx.complete(&peer)?
            }
            None => {
                let PeerPublicKey::Rsa(key) = &server_key else {
                    return Err(Error::General("RSA key exchange needs an RSA certificate".into()));
                };
                let (premaster, encrypted) = rsa_encrypt_premaster(key, client_version)?;
                match version {
                    ProtocolVersion::SSLv3 => body = encrypted,
                    _ => PayloadU16::new(encrypted).encode(&mut body),
                }
                premaster
            }
        };
        cx.emit(
            &mut transcript,
            HandshakeType::ClientKeyExchange,
            HandshakePayload::ClientKeyExchange(Payload::new(body)),
        )?;

        let secrets = ConnectionSecrets::from_premaster(&premaster, neg.randoms, version, neg.suite);
        let (read, write) = secrets.make_cipher_specs(Side::Client)?;
        cx.reader.prepare_cipher_spec(read);
        cx.writer.prepare_cipher_spec(write);

        // -- CertificateVerify --
        if let (Some(ck), Some(cert_req)) = (&client_cert, &cert_req) {
            let (scheme, sig) = match version.at_least(ProtocolVersion::TLSv1_2) {
                true => {
                    let scheme = ck
                        .key
                        .choose_scheme(cert_req.sigschemes.as_deref())
                        .ok_or(PeerIncompatible::NoSignatureSchemesInCommon)?;
                    let msgs = transcript
                        .take_handshake_buf()
                        .ok_or_else(|| Error::General("client auth transcript missing".into()))?;
                    (Some(scheme), ck.key.sign(Some(scheme), &msgs)?)
                }
                false => {
                    transcript.take_handshake_buf();
                    let digest = transcript.legacy_verify_digest(secrets.master_secret());
                    (None, ck.key.sign_legacy(&digest)?)
                }
            };
            cx.emit(
                &mut transcript,
                HandshakeType::CertificateVerify,
                HandshakePayload::CertificateVerify(DigitallySignedStruct::new(scheme, sig)),
            )?;
            cx.common.client_authenticated = true;
        }

        let mut flight = Flight {
            neg,
            transcript,
            secrets,
            server_cert,
            ticket: Vec::new(),
            resuming: false,
        };
        flight.emit_ccs_and_finished(cx)?;

        Ok(match flight.neg.ticket_ack {
            true => Box::new(ExpectNewTicket(flight)),
            false => Box::new(ExpectCcs(flight)),
        })
    }
}

fn emit_certificate(
    cx: &mut Context<'_>,
    transcript: &mut HandshakeHash,
    chain: Vec<CertificateDer<'static>>,
) -> Result<(), Error> {
    cx.emit(
        transcript,
        HandshakeType::Certificate,
        HandshakePayload::Certificate(chain),
    )
}

/// The keyed part of the handshake, after both sides' key material is
/// known.
pub(super) struct Flight {
    pub(super) neg: Negotiated,
    pub(super) transcript: HandshakeHash,
    pub(super) secrets: ConnectionSecrets,
    pub(super) server_cert: Vec<CertificateDer<'static>>,
    /// The ticket to remember: the one offered when resuming, replaced
    /// by any NewSessionTicket.
    pub(super) ticket: Vec<u8>,
    pub(super) resuming: bool,
}

impl Flight {
    fn emit_ccs_and_finished(&mut self, cx: &mut Context<'_>) -> Result<(), Error> {
        cx.emit_ccs()?;

        if let Some(proto) = &self.neg.npn_protocol {
            cx.emit(
                &mut self.transcript,
                HandshakeType::NextProtocol,
                HandshakePayload::NextProtocol(NextProtocolPayload::new(proto)),
            )?;
        }

        let verify_data = self
            .secrets
            .client_verify_data(&self.transcript);
        cx.emit(
            &mut self.transcript,
            HandshakeType::Finished,
            HandshakePayload::Finished(Payload::new(verify_data)),
        )
    }

    fn save_session(&self) {
        let Some(key) = self.neg.cache_key() else {
            return;
        };
        if self.resuming && !self.neg.ticket_ack {
            return;
        }
        if self.neg.session_id.is_empty() && self.ticket.is_empty() {
            debug!("server offered no way to resume");
            return;
        }

        let state = SessionState::new(
            self.neg.version,
            self.neg.suite.suite,
            self.secrets.master_secret(),
            self.server_cert.clone(),
        );
        self.neg.config.session_cache.put(
            key,
            ClientSessionValue::new(state, self.neg.session_id, self.ticket.clone()),
        );
        trace!("session saved for {}", key);
    }
}

pub(super) struct ExpectNewTicket(pub(super) Flight);

impl State for ExpectNewTicket {
    fn handle(self: Box<Self>, _cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let mut flight = self.0;
        flight.transcript.add_message(&m);
        let nst = require_handshake_msg_move!(
            m,
            HandshakeType::NewSessionTicket,
            HandshakePayload::NewSessionTicket
        )?;
        debug!("got ticket with lifetime hint {}", nst.lifetime_hint);
        flight.ticket = nst.ticket.0;
        Ok(Box::new(ExpectCcs(flight)))
    }
}

pub(super) struct ExpectCcs(pub(super) Flight);

impl State for ExpectCcs {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        match m.payload {
            MessagePayload::ChangeCipherSpec(..) => {}
            payload => {
                return Err(crate::check::inappropriate_message(
                    &payload,
                    &[ContentType::ChangeCipherSpec],
                ));
            }
        }

        cx.reader.change_cipher_spec()?;
        Ok(Box::new(ExpectFinished(self.0)))
    }
}

struct ExpectFinished(Flight);

impl State for ExpectFinished {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let mut flight = self.0;
        let finished = require_handshake_msg!(m, HandshakeType::Finished, HandshakePayload::Finished)?;

        let expect_verify_data = flight
            .secrets
            .server_verify_data(&flight.transcript);
        if !bool::from(expect_verify_data.ct_eq(finished.bytes())) {
            warn!("server Finished did not verify");
            return Err(PeerMisbehaved::IncorrectFinished.into());
        }
        flight.transcript.add_message(&m);

        if flight.resuming {
            flight.emit_ccs_and_finished(cx)?;
        }

        flight.save_session();
        cx.common
            .complete_handshake(&flight.secrets, &*flight.neg.config.key_log);
        Ok(Box::new(ExpectTraffic))
    }
}
