use std::sync::Arc;

use pki_types::CertificateDer;
use subtle::ConstantTimeEq;

use super::hs::Negotiated;
use crate::common_state::{Context, ExpectTraffic, Side, State};
use crate::crypto::kx::{rsa_decrypt_premaster, KeyExchange};
use crate::crypto::sign::{CertifiedKey, SigningKey};
use crate::crypto::verify::PeerPublicKey;
use crate::enums::{ContentType, HandshakeType, ProtocolVersion};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::HandshakeHash;
use crate::key_schedule::ConnectionSecrets;
use crate::log::{debug, trace, warn};
use crate::msgs::base::{Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::Codec;
use crate::msgs::handshake::{HandshakePayload, NewSessionTicketPayload};
use crate::msgs::message::{Message, MessagePayload};
use crate::msgs::persist::SessionState;
use crate::verify;

pub(super) struct ExpectCertificate {
    pub(super) neg: Negotiated,
    pub(super) transcript: HandshakeHash,
    pub(super) server_kx: Option<KeyExchange>,
    pub(super) cert: Arc<CertifiedKey>,
}

impl State for ExpectCertificate {
    fn handle(mut self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        // SSLv3 clients without a certificate send nothing at all.
        if self.neg.version == ProtocolVersion::SSLv3
            && !self.neg.client_auth.mandatory()
            && m.is_handshake_type(HandshakeType::ClientKeyExchange)
        {
            debug!("SSLv3 client skipped its certificate");
            self.transcript.abandon_client_auth();
            let next = ExpectClientKx {
                neg: self.neg,
                transcript: self.transcript,
                server_kx: self.server_kx,
                cert: self.cert,
                client_cert: None,
            };
            return Box::new(next).handle(cx, m);
        }

        self.transcript.add_message(&m);
        let chain = require_handshake_msg_move!(m, HandshakeType::Certificate, HandshakePayload::Certificate)?;

        if chain.is_empty() {
            if self.neg.client_auth.mandatory() {
                return Err(PeerIncompatible::ClientCertificateRequired.into());
            }
            debug!("client auth requested but no certificate supplied");
            self.transcript.abandon_client_auth();
            return Ok(Box::new(ExpectClientKx {
                neg: self.neg,
                transcript: self.transcript,
                server_kx: self.server_kx,
                cert: self.cert,
                client_cert: None,
            }));
        }

        if self.neg.client_auth.verifies() {
            let now = self.neg.config.current_time()?;
            verify::verify_client_chain(
                &self.neg.client_cas,
                self.neg.config.crl_pool.as_deref(),
                &chain,
                now,
            )?;
        }
        trace!("client certificate chain of {} accepted", chain.len());

        Ok(Box::new(ExpectClientKx {
            neg: self.neg,
            transcript: self.transcript,
            server_kx: self.server_kx,
            cert: self.cert,
            client_cert: Some(chain),
        }))
    }
}

pub(super) struct ExpectClientKx {
    pub(super) neg: Negotiated,
    pub(super) transcript: HandshakeHash,
    pub(super) server_kx: Option<KeyExchange>,
    pub(super) cert: Arc<CertifiedKey>,
    pub(super) client_cert: Option<Vec<CertificateDer<'static>>>,
}

impl State for ExpectClientKx {
    fn handle(mut self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let client_kx = require_handshake_msg!(
            m,
            HandshakeType::ClientKeyExchange,
            HandshakePayload::ClientKeyExchange
        )?;
        self.transcript.add_message(&m);

        let premaster = match self.server_kx.take() {
            Some(kx) => {
                let peer = PayloadU8::read_bytes(client_kx.bytes())
                    .map_err(|_| PeerMisbehaved::BadClientKeyExchange)?;
                kx.complete(&peer.0)?
            }
            None => {
                let SigningKey::Rsa(key) = &self.cert.key else {
                    return Err(PeerMisbehaved::BadClientKeyExchange.into());
                };
                // SSLv3 omits the length prefix on the encrypted secret.
                let encrypted = match self.neg.version {
                    ProtocolVersion::SSLv3 => client_kx.bytes().to_vec(),
                    _ => {
                        PayloadU16::read_bytes(client_kx.bytes())
                            .map_err(|_| PeerMisbehaved::BadClientKeyExchange)?
                            .0
                    }
                };
                rsa_decrypt_premaster(key, &encrypted)?
            }
        };

        let secrets = ConnectionSecrets::from_premaster(
            &premaster,
            self.neg.randoms,
            self.neg.version,
            self.neg.suite,
        );
        let (read, write) = secrets.make_cipher_specs(Side::Server)?;
        cx.reader.prepare_cipher_spec(read);
        cx.writer.prepare_cipher_spec(write);

        match self.client_cert {
            Some(client_cert) => Ok(Box::new(ExpectCertificateVerify {
                neg: self.neg,
                transcript: self.transcript,
                secrets,
                client_cert,
            })),
            None => Ok(Box::new(ExpectCcs {
                neg: self.neg,
                transcript: self.transcript,
                secrets,
                resuming: false,
            })),
        }
    }
}

struct ExpectCertificateVerify {
    neg: Negotiated,
    transcript: HandshakeHash,
    secrets: ConnectionSecrets,
    client_cert: Vec<CertificateDer<'static>>,
}

impl State for ExpectCertificateVerify {
    fn handle(mut self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let sig = require_handshake_msg!(
            m,
            HandshakeType::CertificateVerify,
            HandshakePayload::CertificateVerify
        )?;

        let key = PeerPublicKey::from_cert(&self.client_cert[0])?;
        match sig.scheme {
            Some(scheme) => {
                let msgs = self
                    .transcript
                    .take_handshake_buf()
                    .ok_or_else(|| Error::General("client auth transcript missing".into()))?;
                key.verify(Some(scheme), &msgs, &sig.sig.0)?;
            }
            None => {
                self.transcript.take_handshake_buf();
                let digest = self
                    .transcript
                    .legacy_verify_digest(self.secrets.master_secret());
                key.verify_legacy(&digest, &sig.sig.0)?;
            }
        }
        trace!("client CertificateVerify OK");

        self.transcript.add_message(&m);
        cx.common.peer_certificates = self.client_cert;
        cx.common.client_authenticated = true;

        Ok(Box::new(ExpectCcs {
            neg: self.neg,
            transcript: self.transcript,
            secrets: self.secrets,
            resuming: false,
        }))
    }
}

pub(super) struct ExpectCcs {
    pub(super) neg: Negotiated,
    pub(super) transcript: HandshakeHash,
    pub(super) secrets: ConnectionSecrets,
    pub(super) resuming: bool,
}

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

        match self.neg.expect_npn {
            true => Ok(Box::new(ExpectNextProtocol {
                neg: self.neg,
                transcript: self.transcript,
                secrets: self.secrets,
                resuming: self.resuming,
            })),
            false => Ok(Box::new(ExpectFinished {
                neg: self.neg,
                transcript: self.transcript,
                secrets: self.secrets,
                resuming: self.resuming,
            })),
        }
    }
}

struct ExpectNextProtocol {
    neg: Negotiated,
    transcript: HandshakeHash,
    secrets: ConnectionSecrets,
    resuming: bool,
}

impl State for ExpectNextProtocol {
    fn handle(mut self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let next_proto =
            require_handshake_msg!(m, HandshakeType::NextProtocol, HandshakePayload::NextProtocol)?;
        debug!("client selected next protocol {:?}", next_proto.proto.0);
        cx.common.alpn_protocol = Some(next_proto.proto.0.clone());
        self.transcript.add_message(&m);

        Ok(Box::new(ExpectFinished {
            neg: self.neg,
            transcript: self.transcript,
            secrets: self.secrets,
            resuming: self.resuming,
        }))
    }
}

struct ExpectFinished {
    neg: Negotiated,
    transcript: HandshakeHash,
    secrets: ConnectionSecrets,
    resuming: bool,
}

impl State for ExpectFinished {
    fn handle(mut self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let finished = require_handshake_msg!(m, HandshakeType::Finished, HandshakePayload::Finished)?;

        let expect_verify_data = self
            .secrets
            .client_verify_data(&self.transcript);
        if !bool::from(expect_verify_data.ct_eq(finished.bytes())) {
            warn!("client Finished did not verify");
            return Err(PeerMisbehaved::IncorrectFinished.into());
        }

        self.transcript.add_message(&m);

        if !self.resuming {
            if !self.neg.session_id.is_empty() {
                let stored = self
                    .neg
                    .config
                    .session_storage
                    .put(self.neg.session_id.as_ref().to_vec(), session_state(cx, &self.secrets).get_encoding());
                trace!("session saved: {}", stored);
            }

            if self.neg.send_ticket {
                emit_ticket(cx, &mut self.transcript, &self.neg, &self.secrets)?;
            }
            cx.emit_ccs()?;
            emit_finished(cx, &mut self.transcript, &self.secrets)?;
        }

        cx.common
            .complete_handshake(&self.secrets, &*self.neg.config.key_log);
        Ok(Box::new(ExpectTraffic))
    }
}

fn session_state(cx: &Context<'_>, secrets: &ConnectionSecrets) -> SessionState {
    SessionState::new(
        cx.version(),
        secrets.suite().suite,
        secrets.master_secret(),
        cx.common.peer_certificates.clone(),
    )
}

/// Sends NewSessionTicket.  A ticket that fails to encrypt goes out
/// empty, which tells the client not to resume with it.
pub(super) fn emit_ticket(
    cx: &mut Context<'_>,
    transcript: &mut HandshakeHash,
    neg: &Negotiated,
    secrets: &ConnectionSecrets,
) -> Result<(), Error> {
    let plain = session_state(cx, secrets).get_encoding();
    let ticket = neg
        .config
        .ticketer
        .encrypt(&plain)
        .unwrap_or_default();
    let lifetime = neg.config.ticketer.lifetime();

    cx.emit(
        transcript,
        HandshakeType::NewSessionTicket,
        HandshakePayload::NewSessionTicket(NewSessionTicketPayload::new(lifetime, ticket)),
    )
}

pub(super) fn emit_finished(
    cx: &mut Context<'_>,
    transcript: &mut HandshakeHash,
    secrets: &ConnectionSecrets,
) -> Result<(), Error> {
    let verify_data = secrets.server_verify_data(transcript);
    cx.emit(
        transcript,
        HandshakeType::Finished,
        HandshakePayload::Finished(Payload::new(verify_data)),
    )
}
