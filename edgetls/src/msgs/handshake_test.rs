use pki_types::CertificateDer;

use super::base::{Payload, PayloadU16, PayloadU8};
use super::codec::{Codec, Reader};
use super::enums::{
    ClientCertificateType, Compression, ECPointFormat, ExtensionType, NamedGroup,
};
use super::handshake::{
    CertificateRequestPayload, CertificateStatus, CertificateStatusRequest, ClientExtension,
    ClientHelloPayload, ClientSessionTicket, DigitallySignedStruct, EcdheServerKeyExchange,
    HandshakeMessagePayload, HandshakePayload, NewSessionTicketPayload, NextProtocolPayload,
    Random, ServerEcdhParams, ServerExtension, ServerHelloPayload, ServerName, SessionId,
    UnknownExtension,
};
use crate::enums::{CipherSuite, HandshakeType, ProtocolVersion, SignatureScheme};
use crate::error::InvalidMessage;

#[test]
fn rejects_short_random() {
    let bytes = [0x01; 31];
    let mut rd = Reader::init(&bytes);
    assert!(Random::read(&mut rd).is_err());
}

#[test]
fn reads_random() {
    let bytes = [0x01; 32];
    let mut rd = Reader::init(&bytes);
    let rnd = Random::read(&mut rd).unwrap();
    println!("{rnd:?}");

    assert!(!rd.any_left());
}

#[test]
fn debug_random() {
    assert_eq!(
        "0101010101010101010101010101010101010101010101010101010101010101",
        format!("{:?}", Random::from([1; 32]))
    );
}

#[test]
fn rejects_truncated_session_id() {
    let bytes = [32; 32];
    let mut rd = Reader::init(&bytes);
    assert!(SessionId::read(&mut rd).is_err());
}

#[test]
fn rejects_session_id_with_bad_length() {
    let bytes = [33; 33];
    let mut rd = Reader::init(&bytes);
    assert!(SessionId::read(&mut rd).is_err());
}

#[test]
fn session_id_with_different_lengths_are_unequal() {
    let a = SessionId::read(&mut Reader::init(&[1u8, 1])).unwrap();
    let b = SessionId::read(&mut Reader::init(&[2u8, 1, 2])).unwrap();
    assert_ne!(a, b);
}

#[test]
fn accepts_short_session_id() {
    let bytes = [1; 2];
    let mut rd = Reader::init(&bytes);
    let sess = SessionId::read(&mut rd).unwrap();
    println!("{sess:?}");

    assert!(!sess.is_empty());
    assert_ne!(sess, SessionId::empty());
    assert!(!rd.any_left());
}

#[test]
fn accepts_empty_session_id() {
    let bytes = [0; 1];
    let mut rd = Reader::init(&bytes);
    let sess = SessionId::read(&mut rd).unwrap();

    assert!(sess.is_empty());
    assert_eq!(sess, SessionId::empty());
    assert!(!rd.any_left());
}

#[test]
fn session_id_new_cuts_long_input() {
    let sess = SessionId::new(&[7u8; 40]);
    assert_eq!(sess.as_ref(), &[7u8; 32][..]);
}

#[test]
fn refuses_client_exts_with_unparsed_bytes() {
    let mut ext = ClientExtension::EcPointFormats(vec![ECPointFormat::Uncompressed]).get_encoding();
    ext.push(0);
    // fix up the extension length
    ext[3] += 1;
    assert_eq!(
        ClientExtension::read_bytes(&ext).unwrap_err(),
        InvalidMessage::TrailingData("ClientExtension")
    );
}

#[test]
fn refuses_server_ext_with_unparsed_bytes() {
    let mut ext = ServerExtension::RenegotiationInfo(PayloadU8::empty()).get_encoding();
    ext.push(0);
    ext[3] += 1;
    assert_eq!(
        ServerExtension::read_bytes(&ext).unwrap_err(),
        InvalidMessage::TrailingData("ServerExtension")
    );
}

#[test]
fn rejects_truncated_sni() {
    let bytes = [0, 1, 0];
    assert!(Vec::<ServerName>::read(&mut Reader::init(&bytes)).is_err());

    let bytes = [0, 2, 0, 1];
    assert!(Vec::<ServerName>::read(&mut Reader::init(&bytes)).is_err());

    let bytes = [0, 3, 0, 1, 0];
    assert!(Vec::<ServerName>::read(&mut Reader::init(&bytes)).is_err());

    let bytes = [0, 6, 0, 0, 4, 0x68, 0x65];
    assert!(Vec::<ServerName>::read(&mut Reader::init(&bytes)).is_err());
}

#[test]
fn can_round_trip_cert_status_req_for_ocsp() {
    let ext = CertificateStatusRequest::build_ocsp();
    let bytes = ext.get_encoding();
    assert_eq!(bytes, [1, 0, 0, 0, 0]);

    let other = CertificateStatusRequest::read(&mut Reader::init(&bytes)).unwrap();
    assert_eq!(ext, other);
}

#[test]
fn can_round_trip_cert_status_req_for_other() {
    let bytes = [2, 5, 6, 7];
    let ext = CertificateStatusRequest::read(&mut Reader::init(&bytes)).unwrap();
    assert!(matches!(ext, CertificateStatusRequest::Unknown(_)));
    assert_eq!(ext.get_encoding(), bytes);
}

#[test]
fn client_hello_rejects_duplicate_extensions() {
    let mut ch = sample_client_hello_payload();
    ch.extensions
        .push(ClientExtension::NamedGroups(vec![NamedGroup::secp256r1]));
    assert!(ch.has_duplicate_extension());

    let enc = ch.get_encoding();
    assert!(ClientHelloPayload::read_bytes(&enc).is_err());
}

#[test]
fn client_hello_accessors() {
    let ch = sample_client_hello_payload();
    assert_eq!(ch.sni_extension(), Some("hello.test"));
    assert_eq!(
        ch.sigalgs_extension(),
        Some(&[SignatureScheme::ECDSA_NISTP256_SHA256][..])
    );
    assert_eq!(ch.namedgroups_extension(), Some(&[NamedGroup::X25519][..]));
    assert_eq!(
        ch.ecpoints_extension(),
        Some(&[ECPointFormat::Uncompressed][..])
    );
    assert_eq!(
        ch.alpn_extension()
            .map(|protos| protos.len()),
        Some(2)
    );
    assert_eq!(ch.ticket_extension(), Some(&ClientSessionTicket::Request));
    assert!(ch.renegotiation_info().is_some());
    assert!(ch.npn_offered());
    assert!(ch.ocsp_requested());
}

#[test]
fn sni_must_be_a_non_empty_ascii_host_name() {
    let mut ch = sample_client_hello_payload();
    ch.extensions.retain(|ext| ext.ext_type() != ExtensionType::ServerName);
    ch.extensions
        .push(ClientExtension::ServerName(vec![ServerName::host_name("")]));
    assert_eq!(ch.sni_extension(), None);

    ch.extensions.pop();
    ch.extensions
        .push(ClientExtension::ServerName(vec![ServerName::host_name("bücher.test")]));
    assert_eq!(ch.sni_extension(), None);
}

#[test]
fn server_hello_accessors() {
    let sh = sample_server_hello_payload();
    assert_eq!(sh.alpn_protocol(), Some(&b"h2"[..]));
    assert!(sh.ticket_ack());
    assert!(sh.status_ack());
    assert_eq!(
        sh.renegotiation_info()
            .map(|info| info.0.len()),
        Some(0)
    );
    assert_eq!(
        sh.next_protocols()
            .map(|protos| protos.len()),
        Some(2)
    );
}

#[test]
fn next_protocol_is_padded_to_32_bytes() {
    for proto in [&b"h2"[..], &b"http/1.1"[..], &[0x61; 30][..], &[0x61; 31][..]] {
        let np = NextProtocolPayload::new(proto);
        let enc = np.get_encoding();
        assert_eq!(enc.len() % 32, 0, "{proto:?}");
        assert!(!np.padding.0.is_empty());
        assert_eq!(NextProtocolPayload::read_bytes(&enc).unwrap(), np);
    }
}

#[test]
fn npn_server_extension_has_no_outer_length() {
    let ext = ServerExtension::NextProtocols(vec![
        PayloadU8::new(b"h2".to_vec()),
        PayloadU8::new(b"http/1.1".to_vec()),
    ]);
    let enc = ext.get_encoding();
    assert_eq!(&enc[..4], &[0x33, 0x74, 0x00, 12]);
    assert_eq!(&enc[4..7], &[2, b'h', b'2']);
    assert_eq!(ServerExtension::read_bytes(&enc).unwrap(), ext);
}

#[test]
fn ecdhe_server_kx_depends_on_version() {
    let kx = EcdheServerKeyExchange {
        params: ServerEcdhParams::new(NamedGroup::X25519, &[1; 32]),
        dss: DigitallySignedStruct::new(Some(SignatureScheme::RSA_PKCS1_SHA256), vec![2; 64]),
    };
    let mut enc = Vec::new();
    kx.encode(&mut enc);

    let other =
        EcdheServerKeyExchange::read(&mut Reader::init(&enc), ProtocolVersion::TLSv1_2).unwrap();
    assert_eq!(kx, other);

    // without the scheme, the leftover bytes are not a valid signature
    assert!(
        EcdheServerKeyExchange::read(&mut Reader::init(&enc), ProtocolVersion::TLSv1_0).is_err()
    );

    let legacy = EcdheServerKeyExchange {
        params: ServerEcdhParams::new(NamedGroup::secp256r1, &[4; 65]),
        dss: DigitallySignedStruct::new(None, vec![3; 72]),
    };
    let mut enc = Vec::new();
    legacy.encode(&mut enc);
    let other =
        EcdheServerKeyExchange::read(&mut Reader::init(&enc), ProtocolVersion::TLSv1_1).unwrap();
    assert_eq!(legacy, other);
}

#[test]
fn rejects_explicit_curves() {
    let bytes = [1, 0, 0x17, 1, 4];
    assert_eq!(
        ServerEcdhParams::read_bytes(&bytes).unwrap_err(),
        InvalidMessage::UnsupportedCurveType
    );
}

#[test]
fn certificate_request_without_schemes_is_refused_on_tls12() {
    let hm = HandshakeMessagePayload::build(
        HandshakeType::CertificateRequest,
        HandshakePayload::CertificateRequest(CertificateRequestPayload {
            certtypes: vec![ClientCertificateType::RSASign],
            sigschemes: Some(Vec::new()),
            canames: Vec::new(),
        }),
    );
    let enc = hm.get_encoding();
    assert!(HandshakeMessagePayload::read_bytes(&enc).is_err());
}

#[test]
fn rejects_oversized_handshake_message() {
    let bytes = [u8::from(HandshakeType::Certificate), 0x01, 0x00, 0x00];
    assert_eq!(
        HandshakeMessagePayload::read_bytes(&bytes).unwrap_err(),
        InvalidMessage::HandshakePayloadTooLarge
    );
}

#[test]
fn hello_request_with_body_is_unknown() {
    let bytes = [u8::from(HandshakeType::HelloRequest), 0, 0, 1, 0xff];
    let hm = HandshakeMessagePayload::read_bytes(&bytes).unwrap();
    assert!(matches!(hm.payload, HandshakePayload::Unknown(_)));
}

#[test]
fn can_round_trip_all_handshake_payloads() {
    for (hm, version) in all_handshake_payloads() {
        println!("{:?}", hm.typ);
        let bytes = hm.get_encoding();
        let mut rd = Reader::init(&bytes);
        let other = HandshakeMessagePayload::read_version(&mut rd, version).unwrap();
        assert!(!rd.any_left());
        assert_eq!(hm.get_encoding(), other.get_encoding());
        assert_eq!(hm, other);
    }
}

#[test]
fn can_detect_truncation_of_all_handshake_payloads() {
    for (hm, version) in all_handshake_payloads() {
        let mut enc = hm.get_encoding();
        println!("test {hm:?} enc {enc:?}");

        // outer truncation
        for l in 0..enc.len() {
            let mut rd = Reader::init(&enc[..l]);
            assert!(HandshakeMessagePayload::read_version(&mut rd, version).is_err());
        }

        // inner truncation
        for l in 0..enc.len() - 4 {
            put_u24(l as u32, &mut enc[1..]);
            println!("  check len {l:?} enc {enc:?}");

            match (hm.typ, l) {
                (HandshakeType::ClientHello, 41)
                | (HandshakeType::ServerHello, 38)
                | (HandshakeType::ServerKeyExchange, _)
                | (HandshakeType::ClientKeyExchange, _)
                | (HandshakeType::Finished, _) => continue,
                _ => {}
            };

            let mut rd = Reader::init(&enc[..4 + l]);
            assert!(HandshakeMessagePayload::read_version(&mut rd, version).is_err());
        }
    }
}

fn put_u24(u: u32, b: &mut [u8]) {
    b[0] = (u >> 16) as u8;
    b[1] = (u >> 8) as u8;
    b[2] = u as u8;
}

fn sample_client_hello_payload() -> ClientHelloPayload {
    ClientHelloPayload {
        client_version: ProtocolVersion::TLSv1_2,
        random: Random::from([0; 32]),
        session_id: SessionId::empty(),
        cipher_suites: vec![
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
        ],
        compression_methods: vec![Compression::Null],
        extensions: vec![
            ClientExtension::ServerName(vec![ServerName::host_name("hello.test")]),
            ClientExtension::EcPointFormats(vec![ECPointFormat::Uncompressed]),
            ClientExtension::NamedGroups(vec![NamedGroup::X25519]),
            ClientExtension::SignatureAlgorithms(vec![SignatureScheme::ECDSA_NISTP256_SHA256]),
            ClientExtension::SessionTicket(ClientSessionTicket::Request),
            ClientExtension::Protocols(vec![
                PayloadU8::new(b"h2".to_vec()),
                PayloadU8::new(b"http/1.1".to_vec()),
            ]),
            ClientExtension::NextProtocolNegotiation,
            ClientExtension::CertificateStatusRequest(CertificateStatusRequest::build_ocsp()),
            ClientExtension::RenegotiationInfo(PayloadU8::empty()),
            ClientExtension::Unknown(UnknownExtension {
                typ: ExtensionType::Unknown(12345),
                payload: Payload::new(vec![1, 2, 3]),
            }),
        ],
    }
}

fn sample_server_hello_payload() -> ServerHelloPayload {
    ServerHelloPayload {
        server_version: ProtocolVersion::TLSv1_2,
        random: Random::from([0; 32]),
        session_id: SessionId::empty(),
        cipher_suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        compression_method: Compression::Null,
        extensions: vec![
            ServerExtension::EcPointFormats(vec![ECPointFormat::Uncompressed]),
            ServerExtension::ServerNameAck,
            ServerExtension::SessionTicketAck,
            ServerExtension::make_empty_renegotiation_info(),
            ServerExtension::make_alpn(b"h2"),
            ServerExtension::NextProtocols(vec![
                PayloadU8::new(b"h2".to_vec()),
                PayloadU8::new(b"http/1.1".to_vec()),
            ]),
            ServerExtension::CertificateStatusAck,
            ServerExtension::Unknown(UnknownExtension {
                typ: ExtensionType::Unknown(12345),
                payload: Payload::new(vec![1, 2, 3]),
            }),
        ],
    }
}

fn all_handshake_payloads() -> Vec<(HandshakeMessagePayload, ProtocolVersion)> {
    let tls12 = ProtocolVersion::TLSv1_2;
    let tls10 = ProtocolVersion::TLSv1_0;

    let mut ticket_offer = sample_client_hello_payload();
    ticket_offer
        .extensions
        .retain(|ext| ext.ext_type() != ExtensionType::SessionTicket);
    ticket_offer
        .extensions
        .push(ClientExtension::SessionTicket(ClientSessionTicket::Offer(Payload::new(vec![
            1, 2, 3,
        ]))));

    vec![
        (
            HandshakeMessagePayload::build(
                HandshakeType::HelloRequest,
                HandshakePayload::HelloRequest,
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::ClientHello,
                HandshakePayload::ClientHello(sample_client_hello_payload()),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::ClientHello,
                HandshakePayload::ClientHello(ticket_offer),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::ServerHello,
                HandshakePayload::ServerHello(sample_server_hello_payload()),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::Certificate,
                HandshakePayload::Certificate(vec![
                    CertificateDer::from(vec![1, 2, 3]),
                    CertificateDer::from(vec![4, 5]),
                ]),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::ServerKeyExchange,
                HandshakePayload::ServerKeyExchange(Payload::new(vec![1, 2, 3])),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::CertificateRequest,
                HandshakePayload::CertificateRequest(CertificateRequestPayload {
                    certtypes: vec![
                        ClientCertificateType::RSASign,
                        ClientCertificateType::ECDSASign,
                    ],
                    sigschemes: Some(vec![SignatureScheme::RSA_PKCS1_SHA256]),
                    canames: vec![PayloadU16::new(vec![1, 2, 3])],
                }),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::CertificateRequest,
                HandshakePayload::CertificateRequest(CertificateRequestPayload {
                    certtypes: vec![ClientCertificateType::RSASign],
                    sigschemes: None,
                    canames: vec![PayloadU16::new(vec![1, 2, 3])],
                }),
            ),
            tls10,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::ServerHelloDone,
                HandshakePayload::ServerHelloDone,
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::ClientKeyExchange,
                HandshakePayload::ClientKeyExchange(Payload::new(vec![1, 2, 3])),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::CertificateVerify,
                HandshakePayload::CertificateVerify(DigitallySignedStruct::new(
                    Some(SignatureScheme::ECDSA_NISTP256_SHA256),
                    vec![1, 2, 3],
                )),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::CertificateVerify,
                HandshakePayload::CertificateVerify(DigitallySignedStruct::new(
                    None,
                    vec![1, 2, 3],
                )),
            ),
            tls10,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::NewSessionTicket,
                HandshakePayload::NewSessionTicket(NewSessionTicketPayload::new(
                    7200,
                    vec![1, 2, 3],
                )),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::CertificateStatus,
                HandshakePayload::CertificateStatus(CertificateStatus::new(vec![1, 2, 3])),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::NextProtocol,
                HandshakePayload::NextProtocol(NextProtocolPayload::new(b"h2")),
            ),
            tls12,
        ),
        (
            HandshakeMessagePayload::build(
                HandshakeType::Finished,
                HandshakePayload::Finished(Payload::new(vec![1, 2, 3])),
            ),
            tls12,
        ),
    ]
}
