use std::fmt::Write;

use crate::crypto::hash::HashAlgorithm;
use crate::msgs::handshake::{ClientExtension, ClientHelloPayload};
use crate::msgs::enums::is_grease;

/// A JA3 fingerprint of a ClientHello.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ja3 {
    /// `version,ciphers,extensions,curves,point_formats`, each list
    /// joined with `-`.
    pub raw: String,
    /// Lowercase hex MD5 of `raw`.
    pub hash: String,
}

impl Ja3 {
    pub(crate) fn new(hello: &ClientHelloPayload) -> Self {
        let mut raw = u16::from(hello.client_version).to_string();

        raw.push(',');
        join(
            &mut raw,
            hello
                .cipher_suites
                .iter()
                .map(|cs| u16::from(*cs)),
        );

        raw.push(',');
        join(
            &mut raw,
            hello
                .extensions
                .iter()
                .map(|ext| u16::from(ext.ext_type())),
        );

        raw.push(',');
        for ext in &hello.extensions {
            if let ClientExtension::NamedGroups(groups) = ext {
                join(&mut raw, groups.iter().map(|g| u16::from(*g)));
            }
        }

        raw.push(',');
        for ext in &hello.extensions {
            if let ClientExtension::EcPointFormats(formats) = ext {
                join(&mut raw, formats.iter().map(|f| u16::from(u8::from(*f))));
            }
        }

        let mut hash = String::with_capacity(32);
        for b in HashAlgorithm::Md5.hash(raw.as_bytes()) {
            let _ = write!(hash, "{:02x}", b);
        }

        Self { raw, hash }
    }
}

fn join(out: &mut String, values: impl Iterator<Item = u16>) {
    let mut first = true;
    for value in values.filter(|v| !is_grease(*v)) {
        if !first {
            out.push('-');
        }
        first = false;
        let _ = write!(out, "{}", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{CipherSuite, ProtocolVersion};
    use crate::msgs::base::Payload;
    use crate::msgs::enums::{Compression, ECPointFormat, ExtensionType, NamedGroup};
    use crate::msgs::handshake::{
        ClientSessionTicket, Random, ServerName, SessionId, UnknownExtension,
    };

    fn hello(
        version: ProtocolVersion,
        suites: Vec<CipherSuite>,
        extensions: Vec<ClientExtension>,
    ) -> ClientHelloPayload {
        ClientHelloPayload {
            client_version: version,
            random: Random([0u8; 32]),
            session_id: SessionId::empty(),
            cipher_suites: suites,
            compression_methods: vec![Compression::Null],
            extensions,
        }
    }

    #[test]
    fn fingerprint_skips_grease() {
        let ch = hello(
            ProtocolVersion::TLSv1_2,
            vec![
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
                CipherSuite::Unknown(0x0a0a),
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            ],
            vec![
                ClientExtension::ServerName(vec![ServerName::host_name("example.com")]),
                ClientExtension::Unknown(UnknownExtension {
                    typ: ExtensionType::Unknown(0x1a1a),
                    payload: Payload::empty(),
                }),
                ClientExtension::NamedGroups(vec![
                    NamedGroup::X25519,
                    NamedGroup::secp256r1,
                    NamedGroup::Unknown(0x2a2a),
                ]),
                ClientExtension::EcPointFormats(vec![ECPointFormat::Uncompressed]),
                ClientExtension::SessionTicket(ClientSessionTicket::Request),
            ],
        );

        let ja3 = Ja3::new(&ch);
        assert_eq!(ja3.raw, "771,49199-47,0-10-11-35,29-23,0");
        assert_eq!(ja3.hash, "bfaf53f4179213a0c517c8d8b2b3aea8");
    }

    #[test]
    fn fingerprint_without_extensions() {
        let ch = hello(
            ProtocolVersion::TLSv1_0,
            vec![
                CipherSuite::TLS_RSA_WITH_RC4_128_MD5,
                CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
                CipherSuite::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
            ],
            vec![],
        );

        let ja3 = Ja3::new(&ch);
        assert_eq!(ja3.raw, "769,4-5-10,,,");
        assert_eq!(ja3.hash, "73c580309d73416556b36e213d598ac1");
    }
}
