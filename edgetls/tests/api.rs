//! Assorted public API tests, each running real connections over
//! loopback TCP.

use std::io::{Read, Write};
use std::net::{IpAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;

use edgetls::client::ClientSessionMemoryCache;
use edgetls::server::{
    ClientAuthType, ClientHelloInfo, MultiCertificate, PemKeyPairLoader, Rule, ServerRule,
    ServerSessionMemoryCache,
};
use edgetls::{
    find_suite, AlertDescription, CertificateError, CertifiedKey, CipherSuite, CipherSuitePreference,
    ClientSessionCache, Conn, Error, FixedTimeProvider, Grade, KeyLog, MemoryCrlPool, PeerIncompatible,
    PeerMisbehaved, ProtocolVersion, ServerConfig, Ticketer, ALL_CIPHER_SUITES,
};

mod common;
use common::*;

fn suites(suites: &[CipherSuite]) -> Arc<CipherSuitePreference> {
    Arc::new(CipherSuitePreference::new(suites, None).unwrap())
}

#[test]
fn handshake_with_each_key_type() {
    for kt in ALL_KEY_TYPES {
        let server_config = Arc::new(make_server_config(*kt));
        let client_config = Arc::new(make_client_config(*kt));

        let (client, server) = do_handshake(&server_config, &client_config).unwrap();
        assert!(client.handshake_complete);
        assert!(server.handshake_complete);
        assert_eq!(client.version, Some(ProtocolVersion::TLSv1_2));
        assert_eq!(server.version, client.version);
        assert_eq!(server.cipher_suite, client.cipher_suite);
        assert!(!client.did_resume);
        assert!(!server.did_resume);

        let suite = find_suite(client.cipher_suite.unwrap()).unwrap();
        assert!(suite.is_ecdhe());
        assert_eq!(suite.is_ecdsa(), *kt == KeyType::Ecdsa);

        assert_eq!(server.server_name.as_deref(), Some("testserver.com"));
        assert_eq!(server.grade, Grade::A);
        assert_eq!(
            client.peer_certificates,
            kt.certified_key("end").cert
        );
        assert!(client.client_random.is_some());
        assert_eq!(client.client_random, server.client_random);
        assert_eq!(client.server_random, server.server_random);
        assert_eq!(client.master_secret, server.master_secret);
    }
}

#[test]
fn every_suite_negotiates_at_tls12() {
    for kt in ALL_KEY_TYPES {
        let mut server_config = make_server_config(*kt);
        server_config.grade = Grade::C;
        let server_config = Arc::new(server_config);

        for suite in ALL_CIPHER_SUITES
            .iter()
            .filter(|s| s.is_ecdsa() == (*kt == KeyType::Ecdsa))
        {
            let mut client_config = make_client_config(*kt);
            client_config.cipher_suites = suites(&[suite.suite]);

            let (client, server) = do_handshake(&server_config, &Arc::new(client_config)).unwrap();
            assert_eq!(client.cipher_suite, Some(suite.suite), "{:?}", suite);
            assert_eq!(server.cipher_suite, Some(suite.suite), "{:?}", suite);
            assert_eq!(client.version, Some(ProtocolVersion::TLSv1_2));
        }
    }
}

#[test]
fn legacy_versions_with_cbc_suites() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.grade = Grade::C;
    server_config.ssl3_poodle_defence = false;
    let server_config = Arc::new(server_config);

    for version in [
        ProtocolVersion::SSLv3,
        ProtocolVersion::TLSv1_0,
        ProtocolVersion::TLSv1_1,
    ] {
        for suite in [
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA,
        ] {
            let mut client_config = make_client_config(KeyType::Rsa);
            client_config.min_version = version;
            client_config.max_version = version;
            client_config.cipher_suites = suites(&[suite]);

            let (client, server) = do_handshake(&server_config, &Arc::new(client_config)).unwrap();
            assert_eq!(client.version, Some(version));
            assert_eq!(server.version, Some(version));
            assert_eq!(client.cipher_suite, Some(suite));
        }
    }
}

#[test]
fn rc4_end_to_end_under_grade_c() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.grade = Grade::C;

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.cipher_suites = suites(&[CipherSuite::TLS_RSA_WITH_RC4_128_SHA]);
    client_config.min_version = ProtocolVersion::TLSv1_0;
    client_config.max_version = ProtocolVersion::TLSv1_2;

    let (client, server) = do_handshake(&Arc::new(server_config), &Arc::new(client_config)).unwrap();
    assert_eq!(client.version, Some(ProtocolVersion::TLSv1_2));
    assert_eq!(client.cipher_suite, Some(CipherSuite::TLS_RSA_WITH_RC4_128_SHA));
    assert_eq!(server.cipher_suite, Some(CipherSuite::TLS_RSA_WITH_RC4_128_SHA));
    assert!(!client.did_resume);
    assert_eq!(server.grade, Grade::C);
}

#[test]
fn grade_a_refuses_rc4_only_client() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.cipher_suites = suites(&[
        CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
        CipherSuite::TLS_RSA_WITH_RC4_128_MD5,
    ]);

    let outcome = do_handshake(&server_config, &Arc::new(client_config));
    assert_eq!(
        outcome.server_error(),
        Some(PeerIncompatible::NoCipherSuitesInCommon.into())
    );
    assert_eq!(
        outcome.client_error(),
        Some(Error::AlertReceived(AlertDescription::HandshakeFailure))
    );
}

#[test]
fn grade_a_plus_requires_tls12() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.grade = Grade::APlus;

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.max_version = ProtocolVersion::TLSv1_1;

    let outcome = do_handshake(&Arc::new(server_config), &Arc::new(client_config));
    assert_eq!(
        outcome.server_error(),
        Some(PeerIncompatible::VersionBelowGradeFloor.into())
    );
    assert_eq!(
        outcome.client_error(),
        Some(Error::AlertReceived(AlertDescription::ProtocolVersion))
    );
}

#[test]
fn ssl3_under_grade_c_is_forced_onto_rc4() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.grade = Grade::C;

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.min_version = ProtocolVersion::SSLv3;
    client_config.max_version = ProtocolVersion::SSLv3;

    let (client, server) = do_handshake(&Arc::new(server_config), &Arc::new(client_config)).unwrap();
    assert_eq!(server.version, Some(ProtocolVersion::SSLv3));
    let suite = find_suite(client.cipher_suite.unwrap()).unwrap();
    assert!(suite.is_rc4(), "{:?}", suite);
}

#[test]
fn ssl3_refused_under_grade_a() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.min_version = ProtocolVersion::SSLv3;
    client_config.max_version = ProtocolVersion::SSLv3;

    let outcome = do_handshake(&server_config, &Arc::new(client_config));
    assert_eq!(
        outcome.server_error(),
        Some(PeerIncompatible::VersionBelowGradeFloor.into())
    );
}

/// Tightens the grade for one hostname and sets its protocols.
struct StrictFor(&'static str);

impl ServerRule for StrictFor {
    fn rule(&self, hello: &ClientHelloInfo<'_>) -> Option<Rule> {
        (hello.server_name == Some(self.0)).then(|| Rule {
            grade: Grade::APlus,
            client_auth: ClientAuthType::NoClientCert,
            client_cas: None,
            chacha20: false,
            dynamic_record: true,
            next_protos: vec![b"h2".to_vec()],
        })
    }
}

#[test]
fn server_rule_chooses_grade_and_protocols() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.rule = Some(Arc::new(StrictFor("testserver.com")));
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    let server_config = Arc::new(server_config);

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.alpn_protocols = vec![b"http/1.1".to_vec(), b"h2".to_vec()];
    let (client, server) = do_handshake(&server_config, &Arc::new(client_config.clone())).unwrap();
    assert_eq!(server.grade, Grade::APlus);
    assert_eq!(client.negotiated_protocol.as_deref(), Some(&b"h2"[..]));
    assert!(!find_suite(server.cipher_suite.unwrap())
        .unwrap()
        .is_chacha20());

    client_config.max_version = ProtocolVersion::TLSv1_1;
    let outcome = do_handshake(&server_config, &Arc::new(client_config));
    assert_eq!(
        outcome.server_error(),
        Some(PeerIncompatible::VersionBelowGradeFloor.into())
    );
}

#[test]
fn ticket_resumption() {
    for kt in ALL_KEY_TYPES {
        let mut server_config = make_server_config(*kt);
        server_config.ticketer = Arc::new(Ticketer::new().unwrap());
        let server_config = Arc::new(server_config);

        let mut client_config = make_client_config(*kt);
        client_config.session_cache = Arc::new(ClientSessionMemoryCache::new(8));
        let client_config = Arc::new(client_config);

        let (first, _) = do_handshake(&server_config, &client_config).unwrap();
        assert!(!first.did_resume);

        let (client, server) = do_handshake(&server_config, &client_config).unwrap();
        assert!(client.did_resume);
        assert!(server.did_resume);
        assert_eq!(client.cipher_suite, first.cipher_suite);
        assert_eq!(client.version, first.version);
        assert_eq!(client.peer_certificates, first.peer_certificates);
        assert_ne!(client.master_secret, None);
        assert_eq!(client.master_secret, first.master_secret);
    }
}

#[test]
fn corrupt_ticket_falls_back_to_full_handshake() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.ticketer = Arc::new(Ticketer::new().unwrap());
    let server_config = Arc::new(server_config);

    let cache = Arc::new(ClientSessionMemoryCache::new(8));
    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.session_cache = cache.clone();
    let client_config = Arc::new(client_config);

    do_handshake(&server_config, &client_config).unwrap();

    let mut session = cache.get("testserver.com").unwrap();
    assert!(!session.ticket.is_empty());
    let last = session.ticket.len() - 1;
    session.ticket[last] ^= 0x01;
    cache.put("testserver.com", session);

    let (client, server) = do_handshake(&server_config, &client_config).unwrap();
    assert!(!client.did_resume);
    assert!(!server.did_resume);

    // the fresh ticket issued then is good
    let (client, _) = do_handshake(&server_config, &client_config).unwrap();
    assert!(client.did_resume);
}

#[test]
fn tickets_survive_key_rotation() {
    let old = [0x11u8; 32];
    let new = [0x22u8; 32];
    let ticketer = Arc::new(Ticketer::from_secrets(&[old]).unwrap());

    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.ticketer = ticketer.clone();
    let server_config = Arc::new(server_config);

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.session_cache = Arc::new(ClientSessionMemoryCache::new(8));
    let client_config = Arc::new(client_config);

    do_handshake(&server_config, &client_config).unwrap();

    ticketer.set_secrets(&[new, old]).unwrap();
    let (client, _) = do_handshake(&server_config, &client_config).unwrap();
    assert!(client.did_resume);

    ticketer.set_secrets(&[[0x33u8; 32]]).unwrap();
    let (client, _) = do_handshake(&server_config, &client_config).unwrap();
    assert!(!client.did_resume);
}

#[test]
fn session_id_resumption() {
    let mut server_config = make_server_config(KeyType::Ecdsa);
    server_config.session_storage = ServerSessionMemoryCache::new(32);
    let server_config = Arc::new(server_config);

    let mut client_config = make_client_config(KeyType::Ecdsa);
    client_config.session_cache = Arc::new(ClientSessionMemoryCache::new(8));
    client_config.enable_tickets = false;
    let client_config = Arc::new(client_config);

    let (first, _) = do_handshake(&server_config, &client_config).unwrap();
    assert!(!first.did_resume);

    let (client, server) = do_handshake(&server_config, &client_config).unwrap();
    assert!(client.did_resume);
    assert!(server.did_resume);
    assert_eq!(client.cipher_suite, first.cipher_suite);
}

#[test]
fn no_resumption_without_server_storage() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.session_cache = Arc::new(ClientSessionMemoryCache::new(8));
    let client_config = Arc::new(client_config);

    for _ in 0..2 {
        let (client, server) = do_handshake(&server_config, &client_config).unwrap();
        assert!(!client.did_resume);
        assert!(!server.did_resume);
    }
}

fn client_auth_server_config(kt: KeyType, client_auth: ClientAuthType) -> ServerConfig {
    let mut config = make_server_config(kt);
    config.client_auth = client_auth;
    config.client_cas = kt.roots();
    config
}

#[test]
fn client_auth_with_each_key_type() {
    for kt in ALL_KEY_TYPES {
        let server_config = Arc::new(client_auth_server_config(
            *kt,
            ClientAuthType::RequireAndVerifyClientCert,
        ));
        let client_config = Arc::new(make_client_config_with_auth(*kt));

        let (client, server) = do_handshake(&server_config, &client_config).unwrap();
        assert!(client.client_authenticated);
        assert!(server.client_authenticated);
        assert_eq!(
            server.peer_certificates,
            kt.certified_key("client").cert
        );
    }
}

#[test]
fn client_auth_missing_certificate() {
    let server_config = Arc::new(client_auth_server_config(
        KeyType::Rsa,
        ClientAuthType::RequireAnyClientCert,
    ));
    let client_config = Arc::new(make_client_config(KeyType::Rsa));

    let outcome = do_handshake(&server_config, &client_config);
    assert_eq!(
        outcome.server_error(),
        Some(PeerIncompatible::ClientCertificateRequired.into())
    );
    assert_eq!(
        outcome.client_error(),
        Some(Error::AlertReceived(AlertDescription::HandshakeFailure))
    );
}

#[test]
fn client_auth_optional_certificate() {
    let server_config = Arc::new(client_auth_server_config(
        KeyType::Ecdsa,
        ClientAuthType::VerifyClientCertIfGiven,
    ));

    let (client, server) =
        do_handshake(&server_config, &Arc::new(make_client_config(KeyType::Ecdsa))).unwrap();
    assert!(!client.client_authenticated);
    assert!(!server.client_authenticated);

    let (_, server) = do_handshake(
        &server_config,
        &Arc::new(make_client_config_with_auth(KeyType::Ecdsa)),
    )
    .unwrap();
    assert!(server.client_authenticated);
}

#[test]
fn client_auth_untrusted_certificate() {
    // ecdsa client certificate, rsa trust anchors
    let server_config = Arc::new(client_auth_server_config(
        KeyType::Rsa,
        ClientAuthType::RequireAndVerifyClientCert,
    ));
    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.client_auth_cert = Some(KeyType::Ecdsa.certified_key("client"));

    let outcome = do_handshake(&server_config, &Arc::new(client_config));
    assert_eq!(
        outcome.server_error(),
        Some(CertificateError::UnknownIssuer.into())
    );
    assert_eq!(
        outcome.client_error(),
        Some(Error::AlertReceived(AlertDescription::UnknownCA))
    );
}

#[test]
fn revoked_client_certificate() {
    let mut crls = MemoryCrlPool::new();
    crls.add_pem_file(KeyType::Rsa.path_for("client.revoked.crl.pem"))
        .unwrap();

    let mut server_config = client_auth_server_config(KeyType::Rsa, ClientAuthType::RequireAndVerifyClientCert);
    server_config.crl_pool = Some(Arc::new(crls));
    let client_config = Arc::new(make_client_config_with_auth(KeyType::Rsa));

    let outcome = do_handshake(&Arc::new(server_config), &client_config);
    assert_eq!(
        outcome.server_error(),
        Some(Error::InvalidCertificate(CertificateError::Revoked))
    );
    assert_eq!(
        outcome.client_error(),
        Some(Error::AlertReceived(AlertDescription::CertificateRevoked))
    );
}

#[test]
fn sni_selects_certificate() {
    for kt in ALL_KEY_TYPES {
        let end = kt.certified_key("end");
        let other = kt.certified_key("other");
        let server_config = Arc::new(make_server_config_with_certs(*kt, vec![other.clone(), end.clone()]));

        for (name, want) in [
            ("testserver.com", &end),
            ("foo.wild.test", &end),
            ("other.test", &other),
        ] {
            let mut client_config = make_client_config(*kt);
            client_config.server_name = Some(name.to_string());

            let (client, server) = do_handshake(&server_config, &Arc::new(client_config)).unwrap();
            assert_eq!(client.peer_certificates, want.cert, "{name}");
            assert_eq!(server.server_name.as_deref(), Some(name));
        }
    }
}

fn make_server_config_with_certs(kt: KeyType, certs: Vec<Arc<CertifiedKey>>) -> ServerConfig {
    let mut config = make_server_config(kt);
    config.certificates = certs;
    config
}

#[derive(Debug)]
struct AlwaysOther(Arc<CertifiedKey>);

impl MultiCertificate for AlwaysOther {
    fn certificate(&self, _: &ClientHelloInfo<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.0.clone())
    }
}

#[test]
fn certificate_hook_overrides_sni() {
    let other = KeyType::Rsa.certified_key("other");
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.multi_certificate = Some(Arc::new(AlwaysOther(other.clone())));

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.insecure_skip_verify = true;

    let (client, _) = do_handshake(&Arc::new(server_config), &Arc::new(client_config)).unwrap();
    assert_eq!(client.peer_certificates, other.cert);
}

#[test]
fn server_name_mismatch() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));
    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.server_name = Some("not-the-server.com".to_string());

    let outcome = do_handshake(&server_config, &Arc::new(client_config));
    assert_eq!(
        outcome.client_error(),
        Some(CertificateError::NotValidForName.into())
    );
    assert_eq!(
        outcome.server_error(),
        Some(Error::AlertReceived(AlertDescription::BadCertificate))
    );
}

#[test]
fn server_chain_from_unknown_issuer() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));
    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.roots = KeyType::Ecdsa.roots();

    let outcome = do_handshake(&server_config, &Arc::new(client_config.clone()));
    assert_eq!(
        outcome.client_error(),
        Some(CertificateError::UnknownIssuer.into())
    );
    assert_eq!(
        outcome.server_error(),
        Some(Error::AlertReceived(AlertDescription::UnknownCA))
    );

    client_config.insecure_skip_verify = true;
    do_handshake(&server_config, &Arc::new(client_config)).unwrap();
}

#[test]
fn alpn_server_preference() {
    let mut server_config = make_server_config(KeyType::Ecdsa);
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    let server_config = Arc::new(server_config);

    let mut client_config = make_client_config(KeyType::Ecdsa);
    client_config.alpn_protocols = vec![b"http/1.1".to_vec(), b"h2".to_vec()];
    let (client, server) = do_handshake(&server_config, &Arc::new(client_config.clone())).unwrap();
    assert_eq!(client.negotiated_protocol.as_deref(), Some(&b"h2"[..]));
    assert_eq!(server.negotiated_protocol.as_deref(), Some(&b"h2"[..]));

    client_config.alpn_protocols = vec![b"spdy/3".to_vec()];
    let (client, server) = do_handshake(&server_config, &Arc::new(client_config)).unwrap();
    assert_eq!(client.negotiated_protocol, None);
    assert_eq!(server.negotiated_protocol, None);
}

#[test]
fn npn_for_clients_without_alpn() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    client_config.enable_npn = true;

    let (client, server) = do_handshake(&Arc::new(server_config), &Arc::new(client_config)).unwrap();
    assert_eq!(client.negotiated_protocol.as_deref(), Some(&b"http/1.1"[..]));
    assert_eq!(server.negotiated_protocol.as_deref(), Some(&b"http/1.1"[..]));
}

fn ocsp_server_config() -> ServerConfig {
    let end = CertifiedKey::from_pem_files(
        KeyType::Rsa.path_for("end.fullchain"),
        KeyType::Rsa.path_for("end.key"),
    )
    .unwrap()
    .with_ocsp(KeyType::Rsa.bytes_for("end.ocsp"));
    make_server_config_with_certs(KeyType::Rsa, vec![Arc::new(end)])
}

#[test]
fn ocsp_stapled_when_requested_and_fresh() {
    let server_config = Arc::new(ocsp_server_config());
    let mut client_config = make_client_config(KeyType::Rsa);

    let (client, _) = do_handshake(&server_config, &Arc::new(client_config.clone())).unwrap();
    assert_eq!(client.ocsp_response, None);

    client_config.request_ocsp = true;
    let (client, server) = do_handshake(&server_config, &Arc::new(client_config)).unwrap();
    assert_eq!(client.ocsp_response, Some(KeyType::Rsa.bytes_for("end.ocsp")));
    assert_eq!(server.ocsp_response, client.ocsp_response);
}

#[test]
fn stale_ocsp_response_not_stapled() {
    let mut server_config = ocsp_server_config();
    // after the response's nextUpdate
    server_config.time_provider = Arc::new(FixedTimeProvider::from_secs(2_114_380_800));

    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.request_ocsp = true;

    let (client, server) = do_handshake(&Arc::new(server_config), &Arc::new(client_config)).unwrap();
    assert_eq!(client.ocsp_response, None);
    assert_eq!(server.ocsp_response, None);
}

#[test]
fn ja3_fingerprint_recorded() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));
    let (client, server) =
        do_handshake(&server_config, &Arc::new(make_client_config(KeyType::Rsa))).unwrap();

    assert_eq!(client.ja3, None);
    let ja3 = server.ja3.unwrap();
    assert!(ja3.raw.starts_with("771,"), "{}", ja3.raw);
    assert_eq!(ja3.raw.matches(',').count(), 4);
    assert_eq!(ja3.hash.len(), 32);
}

#[derive(Debug, Default)]
struct KeyLogToVec(Mutex<Vec<([u8; 32], [u8; 48])>>);

impl KeyLog for KeyLogToVec {
    fn log(&self, client_random: &[u8; 32], master_secret: &[u8; 48]) {
        self.0
            .lock()
            .unwrap()
            .push((*client_random, *master_secret));
    }
}

#[test]
fn key_log_sees_master_secret() {
    let server_log = Arc::new(KeyLogToVec::default());
    let client_log = Arc::new(KeyLogToVec::default());

    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.key_log = server_log.clone();
    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.key_log = client_log.clone();

    let (client, _) = do_handshake(&Arc::new(server_config), &Arc::new(client_config)).unwrap();

    let expected = vec![(client.client_random.unwrap(), client.master_secret.unwrap())];
    assert_eq!(*server_log.0.lock().unwrap(), expected);
    assert_eq!(*client_log.0.lock().unwrap(), expected);
}

#[test]
fn concurrent_read_and_write() {
    const LEN: usize = 256 * 1024;
    let data: Vec<u8> = (0..LEN).map(|i| i as u8).collect();

    let server_config = Arc::new(make_server_config(KeyType::Ecdsa));
    let (addr, server) = spawn_server(&server_config, |conn| {
        let mut buf = [0u8; 4096];
        let mut echoed = 0;
        while echoed < LEN {
            let n = (&*conn).read(&mut buf)?;
            if n == 0 {
                break;
            }
            (&*conn).write_all(&buf[..n])?;
            echoed += n;
        }
        conn.close()
    });

    let client_config = Arc::new(make_client_config(KeyType::Ecdsa));
    run_client(addr, &client_config, |conn| {
        let received = thread::scope(|s| {
            s.spawn(|| {
                for chunk in data.chunks(10_000) {
                    (&*conn).write_all(chunk).unwrap();
                }
            });

            let mut received = Vec::with_capacity(LEN);
            (&*conn).read_to_end(&mut received)?;
            Ok::<_, std::io::Error>(received)
        })?;
        assert_eq!(received, data);
        conn.close()
    })
    .unwrap();

    server.join().unwrap().unwrap();
}

/// An SSLv2-framed ClientHello offering AES128-SHA and one SSLv2-only
/// kind.
fn sslv2_client_hello() -> Vec<u8> {
    let mut body = vec![
        0x01, // CLIENT-HELLO
        0x03, 0x01, // TLS1.0
        0x00, 0x06, // cipher specs
        0x00, 0x00, // session id
        0x00, 0x10, // challenge
        0x00, 0x00, 0x2f, // TLS_RSA_WITH_AES_128_CBC_SHA
        0x01, 0x00, 0x80, // SSL_CK_RC4_128_WITH_MD5
    ];
    body.extend_from_slice(&[0x5a; 16]);

    let mut record = vec![0x80 | (body.len() >> 8) as u8, body.len() as u8];
    record.extend(body);
    record
}

#[test]
fn sslv2_client_hello_accepted_when_enabled() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.accept_sslv2_hello = true;
    let (addr, server) = spawn_server(&Arc::new(server_config), |_| Ok(()));

    let mut sock = raw_client(addr);
    sock.write_all(&sslv2_client_hello())
        .unwrap();

    let (typ, version, body) = read_record(&mut sock).unwrap();
    assert_eq!(typ, 0x16);
    assert_eq!(version, 0x0301);
    assert_eq!(body[0], 0x02); // ServerHello
    assert_eq!(&body[4..6], &[0x03, 0x01]);
    drop(sock);

    // the handshake then stalls, since we never finish it
    assert!(server.join().unwrap().is_err());
}

#[test]
fn sslv2_client_hello_refused_by_default() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));
    let (addr, server) = spawn_server(&server_config, |_| Ok(()));

    let mut sock = raw_client(addr);
    sock.write_all(&sslv2_client_hello())
        .unwrap();

    let (typ, _, body) = read_record(&mut sock).unwrap();
    assert_eq!(typ, 0x15);
    assert_eq!(body, vec![0x02, u8::from(AlertDescription::HandshakeFailure)]);
    drop(sock);

    let err = server.join().unwrap().unwrap_err();
    assert_eq!(
        tls_error(&err),
        Some(PeerIncompatible::Sslv2HelloDisabled.into())
    );
}

/// A ClientHello record offering `suites` with no extensions at all.
fn bare_client_hello(version: ProtocolVersion, suites: &[CipherSuite]) -> Vec<u8> {
    let mut body = u16::from(version).to_be_bytes().to_vec();
    body.extend_from_slice(&[0x33; 32]); // random
    body.push(0); // session id
    body.extend_from_slice(&((suites.len() * 2) as u16).to_be_bytes());
    for suite in suites {
        body.extend_from_slice(&u16::from(*suite).to_be_bytes());
    }
    body.extend_from_slice(&[0x01, 0x00]); // null compression

    let mut hs = vec![0x01, 0x00];
    hs.extend_from_slice(&(body.len() as u16).to_be_bytes());
    hs.extend(body);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(hs.len() as u16).to_be_bytes());
    record.extend(hs);
    record
}

#[test]
fn ecdhe_offered_without_ec_extensions_uses_p256() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));
    let (addr, server) = spawn_server(&server_config, |_| Ok(()));

    let mut sock = raw_client(addr);
    sock.write_all(&bare_client_hello(
        ProtocolVersion::TLSv1_2,
        &[CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256],
    ))
    .unwrap();

    let (typ, _, hello) = read_record(&mut sock).unwrap();
    assert_eq!(typ, 0x16);
    assert_eq!(hello[0], 0x02); // ServerHello
    let suite_at = 4 + 2 + 32 + 1 + usize::from(hello[38]);
    assert_eq!(
        u16::from_be_bytes([hello[suite_at], hello[suite_at + 1]]),
        u16::from(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256)
    );

    let (_, _, cert) = read_record(&mut sock).unwrap();
    assert_eq!(cert[0], 0x0b); // Certificate
    let (_, _, kx) = read_record(&mut sock).unwrap();
    assert_eq!(kx[0], 0x0c); // ServerKeyExchange
    assert_eq!(&kx[4..7], &[0x03, 0x00, 0x17]); // named_curve secp256r1
    let (_, _, done) = read_record(&mut sock).unwrap();
    assert_eq!(done, vec![0x0e, 0, 0, 0]); // ServerHelloDone
    drop(sock);

    // we never send a key exchange
    assert!(server.join().unwrap().is_err());
}

#[test]
fn fallback_scsv_below_our_maximum_is_refused() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));
    let (addr, server) = spawn_server(&server_config, |_| Ok(()));

    let mut sock = raw_client(addr);
    sock.write_all(&bare_client_hello(
        ProtocolVersion::TLSv1_1,
        &[
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_FALLBACK_SCSV,
        ],
    ))
    .unwrap();

    let (typ, _, body) = read_record(&mut sock).unwrap();
    assert_eq!(typ, 0x15);
    assert_eq!(
        body,
        vec![0x02, u8::from(AlertDescription::InappropriateFallback)]
    );
    drop(sock);

    let err = server.join().unwrap().unwrap_err();
    assert_eq!(
        tls_error(&err),
        Some(PeerMisbehaved::InappropriateFallback.into())
    );
}

#[test]
fn fallback_scsv_at_our_maximum_is_accepted() {
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.max_version = ProtocolVersion::TLSv1_1;
    let (addr, server) = spawn_server(&Arc::new(server_config), |_| Ok(()));

    let mut sock = raw_client(addr);
    sock.write_all(&bare_client_hello(
        ProtocolVersion::TLSv1_1,
        &[
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_FALLBACK_SCSV,
        ],
    ))
    .unwrap();

    let (typ, version, body) = read_record(&mut sock).unwrap();
    assert_eq!(typ, 0x16);
    assert_eq!(version, 0x0302);
    assert_eq!(body[0], 0x02);
    drop(sock);
    assert!(server.join().unwrap().is_err());
}

#[test]
fn conn_reports_server_name_before_completion() {
    let server_config = Arc::new(make_server_config(KeyType::Rsa));
    let client_config = Arc::new(make_client_config(KeyType::Rsa));

    let (addr, server) = spawn_server(&server_config, |conn| {
        assert_eq!(conn.server_name().as_deref(), Some("testserver.com"));
        conn.close()
    });
    run_client(addr, &client_config, |conn| conn.close()).unwrap();
    server.join().unwrap().unwrap();
}

#[test]
fn certificates_loaded_by_name() {
    let mut server_config = ServerConfig::new(Vec::new());
    server_config.time_provider = Arc::new(FixedTimeProvider::from_secs(NOW));
    server_config
        .load_certificates(
            &PemKeyPairLoader::new(KeyType::Rsa.path_for("")),
            &["other", "end"],
        )
        .unwrap();
    assert_eq!(server_config.certificates.len(), 2);
    let server_config = Arc::new(server_config);

    // end.ocsp sits next to end.fullchain, so it is stapled
    let mut client_config = make_client_config(KeyType::Rsa);
    client_config.request_ocsp = true;
    let (client, _) = do_handshake(&server_config, &Arc::new(client_config)).unwrap();
    assert_eq!(client.peer_certificates, KeyType::Rsa.certified_key("end").cert);
    assert_eq!(client.ocsp_response, Some(KeyType::Rsa.bytes_for("end.ocsp")));
}

/// Remembers the VIP each ClientHello arrived on.
#[derive(Default)]
struct RecordVip(Mutex<Vec<Option<IpAddr>>>);

impl ServerRule for RecordVip {
    fn rule(&self, hello: &ClientHelloInfo<'_>) -> Option<Rule> {
        self.0.lock().unwrap().push(hello.vip);
        None
    }
}

#[test]
fn rule_sees_vip() {
    let record = Arc::new(RecordVip::default());
    let mut server_config = make_server_config(KeyType::Rsa);
    server_config.rule = Some(record.clone());
    let server_config = Arc::new(server_config);
    let client_config = Arc::new(make_client_config(KeyType::Rsa));

    do_handshake(&server_config, &client_config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (sock, _) = listener.accept().unwrap();
        let conn = Conn::server(sock, server_config);
        assert_eq!(conn.vip(), Some(IpAddr::from([127, 0, 0, 1])));
        conn.set_vip(IpAddr::from([192, 0, 2, 7]));
        conn.handshake().unwrap();
        conn.close().unwrap();
    });
    run_client(addr, &client_config, |conn| conn.close()).unwrap();
    server.join().unwrap();

    assert_eq!(
        *record.0.lock().unwrap(),
        vec![
            Some(IpAddr::from([127, 0, 0, 1])),
            Some(IpAddr::from([192, 0, 2, 7])),
        ]
    );
}
