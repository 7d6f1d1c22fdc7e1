use std::sync::Arc;

use super::server_conn::{ClientAuthType, ClientHelloInfo, Rule, ServerConfig};
use super::tls12::{self, ExpectCcs, ExpectCertificate, ExpectClientKx};
use crate::check::inappropriate_handshake_message;
use crate::common_state::{Context, Side, State};
use crate::crypto::kx::{KeyExchange, SUPPORTED_GROUPS};
use crate::crypto::sign::CertifiedKey;
use crate::crypto::verify::VERIFY_SCHEMES;
use crate::enums::{CipherSuite, ContentType, HandshakeType, ProtocolVersion};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::{HandshakeHash, HandshakeHashBuffer};
use crate::ja3::Ja3;
use crate::key_schedule::{ConnectionRandoms, ConnectionSecrets};
use crate::log::{debug, trace};
use crate::msgs::base::{Payload, PayloadU8};
use crate::msgs::codec::Codec;
use crate::msgs::enums::{ClientCertificateType, Compression, ECPointFormat, NamedGroup};
use crate::msgs::handshake::{
    CertificateRequestPayload, CertificateStatus, ClientHelloPayload, ClientSessionTicket,
    DigitallySignedStruct, EcdheServerKeyExchange, HandshakePayload, Random, ServerEcdhParams,
    ServerExtension, ServerHelloPayload, SessionId,
};
use crate::msgs::message::{Message, MessagePayload};
use crate::msgs::persist::SessionState;
use crate::ocsp;
use crate::suites::{try_cipher_suite, SuiteConstraints, SupportedCipherSuite};
use crate::time_provider::to_system_time;
use crate::verify::RootCertStore;

/// What the ClientHello settled, carried through the rest of the
/// handshake.
pub(super) struct Negotiated {
    pub(super) config: Arc<ServerConfig>,
    pub(super) version: ProtocolVersion,
    pub(super) suite: &'static SupportedCipherSuite,
    pub(super) randoms: ConnectionRandoms,
    pub(super) session_id: SessionId,
    pub(super) send_ticket: bool,
    /// The client must send NextProtocol after its ChangeCipherSpec.
    pub(super) expect_npn: bool,
    pub(super) client_auth: ClientAuthType,
    pub(super) client_cas: Arc<RootCertStore>,
}

pub(crate) struct ExpectClientHello {
    config: Arc<ServerConfig>,
    transcript: HandshakeHashBuffer,
}

impl ExpectClientHello {
    pub(crate) fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            transcript: HandshakeHashBuffer::new(),
        }
    }
}

impl State for ExpectClientHello {
    fn handle(self: Box<Self>, cx: &mut Context<'_>, m: Message) -> Result<Box<dyn State>, Error> {
        let client_hello =
            require_handshake_msg!(m, HandshakeType::ClientHello, HandshakePayload::ClientHello)?;
        trace!("we got a clienthello {:?}", client_hello);
        (*self).handle_client_hello(cx, client_hello, &m)
    }
}

impl ExpectClientHello {
    fn handle_client_hello(
        mut self,
        cx: &mut Context<'_>,
        client_hello: &ClientHelloPayload,
        chm: &Message,
    ) -> Result<Box<dyn State>, Error> {
        if client_hello.has_duplicate_extension() {
            return Err(PeerMisbehaved::DuplicateClientHelloExtensions.into());
        }

        let ja3 = Ja3::new(client_hello);
        let sni = client_hello
            .sni_extension()
            .map(|name| name.to_ascii_lowercase());
        cx.common.server_name = sni.clone();
        cx.common.ja3 = Some(ja3.clone());
        debug!("ja3 {} {}", ja3.hash, ja3.raw);

        let info = ClientHelloInfo {
            server_name: sni.as_deref(),
            cipher_suites: &client_hello.cipher_suites,
            version: client_hello.client_version,
            alpn: client_hello
                .alpn_extension()
                .map(|protos| {
                    protos
                        .iter()
                        .map(|p| p.0.as_slice())
                        .collect()
                })
                .unwrap_or_default(),
            ja3: &ja3,
            vip: cx.common.vip,
        };

        let rule = self
            .config
            .rule
            .as_ref()
            .and_then(|hook| hook.rule(&info))
            .unwrap_or_else(|| self.config.default_rule());
        cx.common.grade = rule.grade;
        cx.writer
            .set_dynamic_record(rule.dynamic_record);

        // -- Version --
        let version = client_hello
            .client_version
            .min(self.config.max_version);
        if !version.is_supported() || !version.at_least(self.config.min_version) {
            return Err(PeerIncompatible::UnsupportedProtocolVersion(client_hello.client_version).into());
        }
        rule.grade.check_version(version)?;

        if client_hello
            .cipher_suites
            .contains(&CipherSuite::TLS_FALLBACK_SCSV)
            && !client_hello
                .client_version
                .at_least(self.config.max_version)
        {
            return Err(PeerMisbehaved::InappropriateFallback.into());
        }

        if !client_hello
            .compression_methods
            .contains(&Compression::Null)
        {
            return Err(PeerIncompatible::NullCompressionRequired.into());
        }

        let secure_renegotiation = match client_hello.renegotiation_info() {
            Some(info) if !info.0.is_empty() => {
                return Err(PeerMisbehaved::InvalidRenegotiationInfo.into());
            }
            Some(_) => true,
            None => client_hello
                .cipher_suites
                .contains(&CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV),
        };

        cx.set_version(version);
        debug!("negotiated version {:?}", version);

        let cert = choose_certificate(&self.config, &info)?;
        trace!("certificate for {:?}: {:?}", info.server_name, cert.dns_names());

        // -- ALPN, or NPN for clients that only know that --
        let protos = match rule.next_protos.is_empty() {
            true => &self.config.alpn_protocols,
            false => &rule.next_protos,
        };
        if let Some(offered) = client_hello.alpn_extension() {
            cx.common.alpn_protocol = protos
                .iter()
                .find(|ours| offered.iter().any(|theirs| theirs.0 == **ours))
                .cloned();
            debug!("ALPN protocol is {:?}", cx.common.alpn_protocol);
        }
        let offer_npn = client_hello.npn_offered()
            && client_hello.alpn_extension().is_none()
            && !protos.is_empty();

        // -- Cipher suite constraints --
        let client_groups = client_hello.namedgroups_extension();
        let client_points = client_hello.ecpoints_extension();
        let mut group = client_groups.and_then(|groups| {
            SUPPORTED_GROUPS
                .iter()
                .find(|g| groups.contains(g))
                .copied()
        });
        let points_ok = client_points.map_or(true, |points| points.contains(&ECPointFormat::Uncompressed));

        let mut constraints = SuiteConstraints {
            version,
            elliptic_ok: group.is_some() && points_ok,
            ecdsa_ok: cert.key.is_ecdsa(),
            chacha_ok: rule.chacha20,
            rc4: rule
                .grade
                .rc4_policy(version, self.config.ssl3_poodle_defence),
        };

        let send_ticket = self.config.ticketer.enabled()
            && client_hello.ticket_extension().is_some();

        // -- Check for resumption --
        // A ticket that decrypts wins; otherwise the session id is
        // looked up.  If we received a ticket, the session id does not
        // name a real session.
        let mut ticket_received = false;
        let resumedata = client_hello
            .ticket_extension()
            .and_then(|ticket_ext| match ticket_ext {
                ClientSessionTicket::Offer(ticket) => Some(ticket),
                _ => None,
            })
            .and_then(|ticket| {
                ticket_received = true;
                debug!("Ticket received");
                let data = self
                    .config
                    .ticketer
                    .decrypt(ticket.bytes());
                if data.is_none() {
                    debug!("Ticket didn't decrypt");
                }
                data
            })
            .or_else(|| {
                if client_hello.session_id.is_empty() || ticket_received {
                    return None;
                }
                self.config
                    .session_storage
                    .get(client_hello.session_id.as_ref())
            })
            .and_then(|data| SessionState::read_bytes(&data).ok())
            .and_then(|state| {
                let suite = can_resume(&self.config, &state, client_hello, &constraints, rule.client_auth)?;
                Some((state, suite))
            });

        self.transcript.add_message(chm);

        let randoms = ConnectionRandoms::new(client_hello.random.0, Random::new()?.0);

        if let Some((state, suite)) = resumedata {
            let neg = Negotiated {
                config: self.config.clone(),
                version,
                suite,
                randoms,
                session_id: client_hello.session_id,
                send_ticket,
                expect_npn: offer_npn,
                client_auth: rule.client_auth,
                client_cas: client_cas(&self.config, &rule),
            };
            let mut extensions = common_extensions(cx, &neg, client_hello, secure_renegotiation, offer_npn, protos);
            if send_ticket {
                extensions.push(ServerExtension::SessionTicketAck);
            }
            return start_resumption(cx, self.transcript, neg, extensions, state);
        }

        // -- Full handshake --
        let mut suite = self.config.cipher_suites.choose(
            &client_hello.cipher_suites,
            &constraints,
            self.config.prefer_server_cipher_suites,
        );
        if suite.is_none() && client_groups.is_none() && client_points.is_none() {
            debug!("retrying with ECDHE over secp256r1 for a client without EC extensions");
            constraints.elliptic_ok = true;
            group = Some(NamedGroup::secp256r1);
            suite = self.config.cipher_suites.choose(
                &client_hello.cipher_suites,
                &constraints,
                self.config.prefer_server_cipher_suites,
            );
        }
        let suite = suite.ok_or(PeerIncompatible::NoCipherSuitesInCommon)?;
        debug!("decided upon suite {:?}", suite);

        let session_id = match self
            .config
            .session_storage
            .can_cache()
        {
            true => SessionId::random()?,
            false => SessionId::empty(),
        };

        let now = self.config.current_time()?;
        let ocsp_response = cert
            .ocsp
            .as_ref()
            .filter(|_| client_hello.ocsp_requested())
            .filter(|response| ocsp::is_fresh(response, to_system_time(now)))
            .cloned();

        let neg = Negotiated {
            config: self.config.clone(),
            version,
            suite,
            randoms,
            session_id,
            send_ticket,
            expect_npn: offer_npn,
            client_auth: rule.client_auth,
            client_cas: client_cas(&self.config, &rule),
        };

        if neg.client_auth.requested() {
            self.transcript.set_client_auth_enabled();
        }
        let mut transcript = self
            .transcript
            .start_hash(version, suite.prf_hash());

        let mut extensions = common_extensions(cx, &neg, client_hello, secure_renegotiation, offer_npn, protos);
        if suite.is_ecdhe() && client_points.is_some() {
            extensions.push(ServerExtension::EcPointFormats(vec![
                ECPointFormat::Uncompressed,
            ]));
        }
        if send_ticket {
            extensions.push(ServerExtension::SessionTicketAck);
        }
        if ocsp_response.is_some() {
            extensions.push(ServerExtension::CertificateStatusAck);
        }

        emit_server_hello(cx, &mut transcript, &neg, extensions)?;
        cx.emit(
            &mut transcript,
            HandshakeType::Certificate,
            HandshakePayload::Certificate(cert.cert.clone()),
        )?;
        if let Some(ocsp_response) = ocsp_response {
            cx.common.ocsp_response = Some(ocsp_response.clone());
            cx.emit(
                &mut transcript,
                HandshakeType::CertificateStatus,
                HandshakePayload::CertificateStatus(CertificateStatus::new(ocsp_response)),
            )?;
        }

        let server_kx = match suite.is_ecdhe() {
            true => {
                let group = group.ok_or(PeerIncompatible::NoKxGroupsInCommon)?;
                Some(emit_server_kx(cx, &mut transcript, &neg, &cert, group, client_hello)?)
            }
            false => None,
        };

        if neg.client_auth.requested() {
            emit_certificate_req(cx, &mut transcript, &neg)?;
        }
        cx.emit(
            &mut transcript,
            HandshakeType::ServerHelloDone,
            HandshakePayload::ServerHelloDone,
        )?;

        if neg.client_auth.requested() {
            Ok(Box::new(ExpectCertificate {
                neg,
                transcript,
                server_kx,
                cert,
            }))
        } else {
            Ok(Box::new(ExpectClientKx {
                neg,
                transcript,
                server_kx,
                cert,
                client_cert: None,
            }))
        }
    }
}

/// The hook first, then an exact SNI match, then a wildcard one label
/// deep, then the first certificate.
fn choose_certificate(config: &ServerConfig, info: &ClientHelloInfo<'_>) -> Result<Arc<CertifiedKey>, Error> {
    if let Some(hook) = &config.multi_certificate {
        if let Some(cert) = hook.certificate(info) {
            return Ok(cert);
        }
    }

    if let Some(name) = info.server_name {
        let has_name = |want: &str| {
            config
                .certificates
                .iter()
                .find(|cert| cert.dns_names().iter().any(|n| n == want))
        };

        if let Some(cert) = has_name(name) {
            return Ok(cert.clone());
        }

        if let Some((_, parent)) = name.split_once('.') {
            if let Some(cert) = has_name(&format!("*.{}", parent)) {
                return Ok(cert.clone());
            }
        }
    }

    config
        .certificates
        .first()
        .cloned()
        .ok_or_else(|| Error::InvalidConfig("no server certificate configured".into()))
}

fn client_cas(config: &ServerConfig, rule: &Rule) -> Arc<RootCertStore> {
    rule.client_cas
        .clone()
        .unwrap_or_else(|| config.client_cas.clone())
}

/// The stored session may be resumed only under today's rules: same
/// version, a suite we and the client still allow, and a client
/// certificate exactly when we still want one.
fn can_resume(
    config: &ServerConfig,
    state: &SessionState,
    client_hello: &ClientHelloPayload,
    constraints: &SuiteConstraints,
    client_auth: ClientAuthType,
) -> Option<&'static SupportedCipherSuite> {
    if state.version != constraints.version {
        debug!("not resuming: session has version {:?}", state.version);
        return None;
    }

    let stored = config
        .cipher_suites
        .suites()
        .iter()
        .find(|s| s.suite == state.cipher_suite)?;
    let suite = try_cipher_suite(
        state.cipher_suite,
        &client_hello.cipher_suites,
        &SuiteConstraints {
            elliptic_ok: true,
            ecdsa_ok: stored.is_ecdsa(),
            ..*constraints
        },
    );
    if suite.is_none() {
        debug!("not resuming: suite {:?} no longer acceptable", state.cipher_suite);
        return None;
    }

    let has_certs = !state.certificates.is_empty();
    if (!has_certs && client_auth.mandatory()) || (has_certs && !client_auth.requested()) {
        debug!("not resuming: client certificate requirement changed");
        return None;
    }

    state.master_secret()?;
    suite
}

/// Extensions sent on both full and resumed handshakes.
fn common_extensions(
    cx: &Context<'_>,
    neg: &Negotiated,
    client_hello: &ClientHelloPayload,
    secure_renegotiation: bool,
    offer_npn: bool,
    protos: &[Vec<u8>],
) -> Vec<ServerExtension> {
    let mut extensions = Vec::new();
    if secure_renegotiation {
        extensions.push(ServerExtension::make_empty_renegotiation_info());
    }
    if let Some(proto) = &cx.common.alpn_protocol {
        extensions.push(ServerExtension::make_alpn(proto));
    } else if offer_npn {
        extensions.push(ServerExtension::NextProtocols(
            protos
                .iter()
                .map(|p| PayloadU8::new(p.clone()))
                .collect(),
        ));
    }
    trace!(
        "extensions for {:?} hello from {:?}: {:?}",
        neg.version,
        client_hello.client_version,
        extensions
    );
    extensions
}

fn emit_server_hello(
    cx: &mut Context<'_>,
    transcript: &mut HandshakeHash,
    neg: &Negotiated,
    extensions: Vec<ServerExtension>,
) -> Result<(), Error> {
    let sh = ServerHelloPayload {
        server_version: neg.version,
        random: Random::from(neg.randoms.server),
        session_id: neg.session_id,
        cipher_suite: neg.suite.suite,
        compression_method: Compression::Null,
        extensions,
    };
    trace!("sending server hello {:?}", sh);
    cx.emit(
        transcript,
        HandshakeType::ServerHello,
        HandshakePayload::ServerHello(sh),
    )
}

fn emit_server_kx(
    cx: &mut Context<'_>,
    transcript: &mut HandshakeHash,
    neg: &Negotiated,
    cert: &CertifiedKey,
    group: NamedGroup,
    client_hello: &ClientHelloPayload,
) -> Result<KeyExchange, Error> {
    let kx = KeyExchange::start(group)?;
    let params = ServerEcdhParams::new(group, &kx.pub_key);

    let mut msg = Vec::new();
    msg.extend(neg.randoms.client);
    msg.extend(neg.randoms.server);
    params.encode(&mut msg);

    let scheme = match neg
        .version
        .at_least(ProtocolVersion::TLSv1_2)
    {
        true => Some(
            cert.key
                .choose_scheme(client_hello.sigalgs_extension())
                .ok_or(PeerIncompatible::NoSignatureSchemesInCommon)?,
        ),
        false => None,
    };
    let sig = cert.key.sign(scheme, &msg)?;

    let skx = EcdheServerKeyExchange {
        params,
        dss: DigitallySignedStruct::new(scheme, sig),
    };
    let mut body = Vec::new();
    skx.encode(&mut body);

    cx.emit(
        transcript,
        HandshakeType::ServerKeyExchange,
        HandshakePayload::ServerKeyExchange(Payload::new(body)),
    )?;
    Ok(kx)
}

fn emit_certificate_req(cx: &mut Context<'_>, transcript: &mut HandshakeHash, neg: &Negotiated) -> Result<(), Error> {
    let cr = CertificateRequestPayload {
        certtypes: vec![
            ClientCertificateType::RSASign,
            ClientCertificateType::ECDSASign,
        ],
        sigschemes: neg
            .version
            .at_least(ProtocolVersion::TLSv1_2)
            .then(|| VERIFY_SCHEMES.to_vec()),
        canames: neg.client_cas.subjects(),
    };

    trace!("Sending CertificateRequest {:?}", cr);
    cx.emit(
        transcript,
        HandshakeType::CertificateRequest,
        HandshakePayload::CertificateRequest(cr),
    )
}

fn start_resumption(
    cx: &mut Context<'_>,
    buffer: HandshakeHashBuffer,
    neg: Negotiated,
    extensions: Vec<ServerExtension>,
    state: SessionState,
) -> Result<Box<dyn State>, Error> {
    debug!("Resuming connection");

    let master_secret = state
        .master_secret()
        .ok_or_else(|| Error::General("stored session has a bad master secret".into()))?;
    let mut transcript = buffer.start_hash(neg.version, neg.suite.prf_hash());

    emit_server_hello(cx, &mut transcript, &neg, extensions)?;

    let secrets = ConnectionSecrets::new_resume(neg.randoms, neg.version, neg.suite, &master_secret);
    let (read, write) = secrets.make_cipher_specs(Side::Server)?;
    cx.reader.prepare_cipher_spec(read);
    cx.writer.prepare_cipher_spec(write);

    cx.common.did_resume = true;
    cx.common.client_authenticated = !state.certificates.is_empty();
    cx.common.peer_certificates = state.certificates;

    if neg.send_ticket {
        tls12::emit_ticket(cx, &mut transcript, &neg, &secrets)?;
    }
    cx.emit_ccs()?;
    tls12::emit_finished(cx, &mut transcript, &secrets)?;

    Ok(Box::new(ExpectCcs {
        neg,
        transcript,
        secrets,
        resuming: true,
    }))
}

/// The reply to a ClientHello after the handshake: the connection
/// refuses renegotiation.
pub(crate) fn refuse_renegotiation(m: &Message) -> Error {
    match &m.payload {
        MessagePayload::Handshake { parsed, .. } if parsed.typ == HandshakeType::ClientHello => {
            PeerMisbehaved::RenegotiationAttempted.into()
        }
        MessagePayload::Handshake { parsed, .. } => {
            inappropriate_handshake_message(parsed, &[HandshakeType::ClientHello])
        }
        payload => crate::check::inappropriate_message(payload, &[ContentType::ApplicationData]),
    }
}
