use std::collections::BTreeSet;
use std::fmt;

use pki_types::CertificateDer;

use crate::rand;
use crate::enums::{CipherSuite, HandshakeType, ProtocolVersion, SignatureScheme};
use crate::error::InvalidMessage;
use crate::msgs::base::{Payload, PayloadU16, PayloadU24, PayloadU8};
use crate::msgs::codec::{self, Codec, LengthPrefixedBuffer, ListLength, Reader, TlsListElement};
use crate::msgs::enums::{
    CertificateStatusType, ClientCertificateType, Compression, ECCurveType, ECPointFormat,
    ExtensionType, NamedGroup, ServerNameType,
};

/// Upper bound on a single handshake message body.
pub(crate) const MAX_HANDSHAKE_SIZE: u32 = 0xffff;

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Random(pub [u8; 32]);

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        super::base::hex(f, &self.0)
    }
}

impl Codec<'_> for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let bytes = match r.take(32) {
            Some(bytes) => bytes,
            None => return Err(InvalidMessage::MissingData("Random")),
        };

        let mut opaque = [0; 32];
        opaque.clone_from_slice(bytes);
        Ok(Self(opaque))
    }
}

impl Random {
    pub(crate) fn new() -> Result<Self, rand::GetRandomFailed> {
        let mut data = [0u8; 32];
        rand::fill_random(&mut data)?;
        Ok(Self(data))
    }
}

impl From<[u8; 32]> for Random {
    #[inline]
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[derive(Copy, Clone)]
pub struct SessionId {
    len: usize,
    data: [u8; 32],
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        super::base::hex(f, &self.data[..self.len])
    }
}

impl PartialEq for SessionId {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for SessionId {}

impl Codec<'_> for SessionId {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.len <= 32);
        bytes.push(self.len as u8);
        bytes.extend_from_slice(self.as_ref());
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let len = u8::read(r)? as usize;
        if len > 32 {
            return Err(InvalidMessage::TrailingData("SessionID"));
        }

        let bytes = match r.take(len) {
            Some(bytes) => bytes,
            None => return Err(InvalidMessage::MissingData("SessionID")),
        };

        let mut out = [0u8; 32];
        out[..len].clone_from_slice(&bytes[..len]);
        Ok(Self { data: out, len })
    }
}

impl SessionId {
    pub fn random() -> Result<Self, rand::GetRandomFailed> {
        let mut data = [0u8; 32];
        rand::fill_random(&mut data)?;
        Ok(Self { data, len: 32 })
    }

    pub fn empty() -> Self {
        Self {
            data: [0u8; 32],
            len: 0,
        }
    }

    /// Builds a session id from at most 32 bytes; longer input is cut.
    pub fn new(bytes: &[u8]) -> Self {
        let len = bytes.len().min(32);
        let mut data = [0u8; 32];
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data, len }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnknownExtension {
    pub(crate) typ: ExtensionType,
    pub(crate) payload: Payload,
}

impl UnknownExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.payload.encode(bytes);
    }

    fn read(typ: ExtensionType, r: &mut Reader<'_>) -> Self {
        let payload = Payload::read(r);
        Self { typ, payload }
    }
}

impl TlsListElement for ECPointFormat {
    const SIZE_LEN: ListLength = ListLength::U8;
}

impl TlsListElement for NamedGroup {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for SignatureScheme {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for CipherSuite {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for Compression {
    const SIZE_LEN: ListLength = ListLength::U8;
}

impl TlsListElement for ClientCertificateType {
    const SIZE_LEN: ListLength = ListLength::U8;
}

/// One entry of the server_name extension.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerName {
    pub typ: ServerNameType,
    pub payload: PayloadU16,
}

impl ServerName {
    pub fn host_name(name: &str) -> Self {
        Self {
            typ: ServerNameType::HostName,
            payload: PayloadU16::new(name.as_bytes().to_vec()),
        }
    }
}

impl Codec<'_> for ServerName {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ServerNameType::read(r)?;
        let payload = PayloadU16::read(r)?;
        Ok(Self { typ, payload })
    }
}

impl TlsListElement for ServerName {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientSessionTicket {
    Request,
    Offer(Payload),
}

/// status_request body; responder ids and request extensions are carried
/// opaquely since the server never interprets them.
#[derive(Clone, Debug, PartialEq)]
pub struct OcspCertificateStatusRequest {
    pub responder_ids: PayloadU16,
    pub extensions: PayloadU16,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CertificateStatusRequest {
    Ocsp(OcspCertificateStatusRequest),
    Unknown((CertificateStatusType, Payload)),
}

impl Codec<'_> for CertificateStatusRequest {
    fn encode(&self, bytes: &mut Vec<u8>) {
        match self {
            Self::Ocsp(ocsp) => {
                CertificateStatusType::OCSP.encode(bytes);
                ocsp.responder_ids.encode(bytes);
                ocsp.extensions.encode(bytes);
            }
            Self::Unknown((typ, payload)) => {
                typ.encode(bytes);
                payload.encode(bytes);
            }
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = CertificateStatusType::read(r)?;

        match typ {
            CertificateStatusType::OCSP => {
                let responder_ids = PayloadU16::read(r)?;
                let extensions = PayloadU16::read(r)?;
                Ok(Self::Ocsp(OcspCertificateStatusRequest {
                    responder_ids,
                    extensions,
                }))
            }
            _ => {
                let data = Payload::read(r);
                Ok(Self::Unknown((typ, data)))
            }
        }
    }
}

impl CertificateStatusRequest {
    pub fn build_ocsp() -> Self {
        Self::Ocsp(OcspCertificateStatusRequest {
            responder_ids: PayloadU16::empty(),
            extensions: PayloadU16::empty(),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientExtension {
    EcPointFormats(Vec<ECPointFormat>),
    NamedGroups(Vec<NamedGroup>),
    SignatureAlgorithms(Vec<SignatureScheme>),
    ServerName(Vec<ServerName>),
    SessionTicket(ClientSessionTicket),
    Protocols(Vec<PayloadU8>),
    NextProtocolNegotiation,
    CertificateStatusRequest(CertificateStatusRequest),
    RenegotiationInfo(PayloadU8),
    Unknown(UnknownExtension),
}

impl ClientExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::EcPointFormats(_) => ExtensionType::ECPointFormats,
            Self::NamedGroups(_) => ExtensionType::EllipticCurves,
            Self::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Self::ServerName(_) => ExtensionType::ServerName,
            Self::SessionTicket(_) => ExtensionType::SessionTicket,
            Self::Protocols(_) => ExtensionType::ALProtocolNegotiation,
            Self::NextProtocolNegotiation => ExtensionType::NextProtocolNegotiation,
            Self::CertificateStatusRequest(_) => ExtensionType::StatusRequest,
            Self::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec<'_> for ClientExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nested = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::EcPointFormats(r) => r.encode(nested.buf),
            Self::NamedGroups(r) => r.encode(nested.buf),
            Self::SignatureAlgorithms(r) => r.encode(nested.buf),
            Self::ServerName(r) => r.encode(nested.buf),
            Self::SessionTicket(ClientSessionTicket::Request)
            | Self::NextProtocolNegotiation => {}
            Self::SessionTicket(ClientSessionTicket::Offer(r)) => r.encode(nested.buf),
            Self::Protocols(r) => r.encode(nested.buf),
            Self::CertificateStatusRequest(r) => r.encode(nested.buf),
            Self::RenegotiationInfo(r) => r.encode(nested.buf),
            Self::Unknown(r) => r.encode(nested.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::ECPointFormats => Self::EcPointFormats(Vec::read(&mut sub)?),
            ExtensionType::EllipticCurves => Self::NamedGroups(Vec::read(&mut sub)?),
            ExtensionType::SignatureAlgorithms => Self::SignatureAlgorithms(Vec::read(&mut sub)?),
            ExtensionType::ServerName => Self::ServerName(Vec::read(&mut sub)?),
            ExtensionType::SessionTicket => {
                if sub.any_left() {
                    Self::SessionTicket(ClientSessionTicket::Offer(Payload::read(&mut sub)))
                } else {
                    Self::SessionTicket(ClientSessionTicket::Request)
                }
            }
            ExtensionType::ALProtocolNegotiation => Self::Protocols(Vec::read(&mut sub)?),
            ExtensionType::NextProtocolNegotiation => Self::NextProtocolNegotiation,
            ExtensionType::StatusRequest => {
                Self::CertificateStatusRequest(CertificateStatusRequest::read(&mut sub)?)
            }
            ExtensionType::RenegotiationInfo => Self::RenegotiationInfo(PayloadU8::read(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ClientExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for ClientExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerExtension {
    EcPointFormats(Vec<ECPointFormat>),
    ServerNameAck,
    SessionTicketAck,
    RenegotiationInfo(PayloadU8),
    Protocols(Vec<PayloadU8>),
    NextProtocols(Vec<PayloadU8>),
    CertificateStatusAck,
    Unknown(UnknownExtension),
}

impl ServerExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::EcPointFormats(_) => ExtensionType::ECPointFormats,
            Self::ServerNameAck => ExtensionType::ServerName,
            Self::SessionTicketAck => ExtensionType::SessionTicket,
            Self::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Self::Protocols(_) => ExtensionType::ALProtocolNegotiation,
            Self::NextProtocols(_) => ExtensionType::NextProtocolNegotiation,
            Self::CertificateStatusAck => ExtensionType::StatusRequest,
            Self::Unknown(r) => r.typ,
        }
    }

    pub fn make_alpn(proto: &[u8]) -> Self {
        Self::Protocols(vec![PayloadU8::new(proto.to_vec())])
    }

    pub fn make_empty_renegotiation_info() -> Self {
        Self::RenegotiationInfo(PayloadU8::empty())
    }
}

impl Codec<'_> for ServerExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nested = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::EcPointFormats(r) => r.encode(nested.buf),
            Self::ServerNameAck | Self::SessionTicketAck | Self::CertificateStatusAck => {}
            Self::RenegotiationInfo(r) => r.encode(nested.buf),
            Self::Protocols(r) => r.encode(nested.buf),
            // NPN lists are u8-prefixed strings with no outer length
            Self::NextProtocols(r) => {
                for proto in r {
                    proto.encode(nested.buf);
                }
            }
            Self::Unknown(r) => r.encode(nested.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::ECPointFormats => Self::EcPointFormats(Vec::read(&mut sub)?),
            ExtensionType::ServerName => Self::ServerNameAck,
            ExtensionType::SessionTicket => Self::SessionTicketAck,
            ExtensionType::StatusRequest => Self::CertificateStatusAck,
            ExtensionType::RenegotiationInfo => Self::RenegotiationInfo(PayloadU8::read(&mut sub)?),
            ExtensionType::ALProtocolNegotiation => Self::Protocols(Vec::read(&mut sub)?),
            ExtensionType::NextProtocolNegotiation => {
                let mut protos = Vec::new();
                while sub.any_left() {
                    protos.push(PayloadU8::read(&mut sub)?);
                }
                Self::NextProtocols(protos)
            }
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ServerExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for ServerExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientHelloPayload {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<Compression>,
    pub extensions: Vec<ClientExtension>,
}

impl Codec<'_> for ClientHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.client_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suites.encode(bytes);
        self.compression_methods.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let mut ret = Self {
            client_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionId::read(r)?,
            cipher_suites: Vec::read(r)?,
            compression_methods: Vec::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        match (r.any_left(), ret.extensions.is_empty()) {
            (true, _) => Err(InvalidMessage::TrailingData("ClientHelloPayload")),
            (_, true) => Ok(ret),
            (_, false) => match ret.has_duplicate_extension() {
                true => Err(InvalidMessage::UnexpectedMessage(
                    "ClientHello with duplicate extensions",
                )),
                false => Ok(ret),
            },
        }
    }
}

impl ClientHelloPayload {
    /// Returns true if there is more than one extension of a given
    /// type.
    pub fn has_duplicate_extension(&self) -> bool {
        let mut seen = BTreeSet::new();

        for ext in &self.extensions {
            let typ = u16::from(ext.ext_type());

            if seen.contains(&typ) {
                return true;
            }
            seen.insert(typ);
        }

        false
    }

    pub fn find_extension(&self, ext: ExtensionType) -> Option<&ClientExtension> {
        self.extensions
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    /// The first host name offered through SNI, if it is valid ASCII.
    pub fn sni_extension(&self) -> Option<&str> {
        let ext = self.find_extension(ExtensionType::ServerName)?;
        match ext {
            ClientExtension::ServerName(names) => names
                .iter()
                .find(|name| name.typ == ServerNameType::HostName)
                .and_then(|name| core::str::from_utf8(&name.payload.0).ok())
                .filter(|name| name.is_ascii() && !name.is_empty()),
            _ => None,
        }
    }

    pub fn sigalgs_extension(&self) -> Option<&[SignatureScheme]> {
        let ext = self.find_extension(ExtensionType::SignatureAlgorithms)?;
        match ext {
            ClientExtension::SignatureAlgorithms(req) => Some(req),
            _ => None,
        }
    }

    pub fn namedgroups_extension(&self) -> Option<&[NamedGroup]> {
        let ext = self.find_extension(ExtensionType::EllipticCurves)?;
        match ext {
            ClientExtension::NamedGroups(req) => Some(req),
            _ => None,
        }
    }

    pub fn ecpoints_extension(&self) -> Option<&[ECPointFormat]> {
        let ext = self.find_extension(ExtensionType::ECPointFormats)?;
        match ext {
            ClientExtension::EcPointFormats(req) => Some(req),
            _ => None,
        }
    }

    pub fn alpn_extension(&self) -> Option<&Vec<PayloadU8>> {
        let ext = self.find_extension(ExtensionType::ALProtocolNegotiation)?;
        match ext {
            ClientExtension::Protocols(req) => Some(req),
            _ => None,
        }
    }

    pub fn ticket_extension(&self) -> Option<&ClientSessionTicket> {
        let ext = self.find_extension(ExtensionType::SessionTicket)?;
        match ext {
            ClientExtension::SessionTicket(t) => Some(t),
            _ => None,
        }
    }

    pub fn renegotiation_info(&self) -> Option<&PayloadU8> {
        let ext = self.find_extension(ExtensionType::RenegotiationInfo)?;
        match ext {
            ClientExtension::RenegotiationInfo(info) => Some(info),
            _ => None,
        }
    }

    pub fn npn_offered(&self) -> bool {
        self.find_extension(ExtensionType::NextProtocolNegotiation)
            .is_some()
    }

    pub fn ocsp_requested(&self) -> bool {
        matches!(
            self.find_extension(ExtensionType::StatusRequest),
            Some(ClientExtension::CertificateStatusRequest(
                CertificateStatusRequest::Ocsp(_)
            ))
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerHelloPayload {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: Compression,
    pub extensions: Vec<ServerExtension>,
}

impl Codec<'_> for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.server_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let mut ret = Self {
            server_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionId::read(r)?,
            cipher_suite: CipherSuite::read(r)?,
            compression_method: Compression::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        r.expect_empty("ServerHelloPayload")
            .map(|_| ret)
    }
}

impl ServerHelloPayload {
    pub fn find_extension(&self, ext: ExtensionType) -> Option<&ServerExtension> {
        self.extensions
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        let ext = self.find_extension(ExtensionType::ALProtocolNegotiation)?;
        match ext {
            ServerExtension::Protocols(protos) => match protos.as_slice() {
                [single] => Some(&single.0),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn next_protocols(&self) -> Option<&[PayloadU8]> {
        let ext = self.find_extension(ExtensionType::NextProtocolNegotiation)?;
        match ext {
            ServerExtension::NextProtocols(protos) => Some(protos),
            _ => None,
        }
    }

    pub fn ticket_ack(&self) -> bool {
        self.find_extension(ExtensionType::SessionTicket)
            .is_some()
    }

    pub fn status_ack(&self) -> bool {
        self.find_extension(ExtensionType::StatusRequest)
            .is_some()
    }

    pub fn renegotiation_info(&self) -> Option<&PayloadU8> {
        let ext = self.find_extension(ExtensionType::RenegotiationInfo)?;
        match ext {
            ServerExtension::RenegotiationInfo(info) => Some(info),
            _ => None,
        }
    }
}

/// ServerECDHParams: `curve_type | named_curve | public(u8 length)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerEcdhParams {
    pub curve_type: ECCurveType,
    pub named_group: NamedGroup,
    pub public: PayloadU8,
}

impl ServerEcdhParams {
    pub fn new(named_group: NamedGroup, pubkey: &[u8]) -> Self {
        Self {
            curve_type: ECCurveType::NamedCurve,
            named_group,
            public: PayloadU8::new(pubkey.to_vec()),
        }
    }
}

impl Codec<'_> for ServerEcdhParams {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.curve_type.encode(bytes);
        self.named_group.encode(bytes);
        self.public.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let curve_type = ECCurveType::read(r)?;
        if curve_type != ECCurveType::NamedCurve {
            return Err(InvalidMessage::UnsupportedCurveType);
        }

        let named_group = NamedGroup::read(r)?;
        let public = PayloadU8::read(r)?;

        Ok(Self {
            curve_type,
            named_group,
            public,
        })
    }
}

/// A signature, with the TLS 1.2 algorithm pair when the version carries
/// one.  Earlier versions imply the algorithm from the key type.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitallySignedStruct {
    pub scheme: Option<SignatureScheme>,
    pub sig: PayloadU16,
}

impl DigitallySignedStruct {
    pub fn new(scheme: Option<SignatureScheme>, sig: Vec<u8>) -> Self {
        Self {
            scheme,
            sig: PayloadU16::new(sig),
        }
    }

    fn encode(&self, bytes: &mut Vec<u8>) {
        if let Some(scheme) = self.scheme {
            scheme.encode(bytes);
        }
        self.sig.encode(bytes);
    }

    fn read(r: &mut Reader<'_>, version: ProtocolVersion) -> Result<Self, InvalidMessage> {
        let scheme = match version.at_least(ProtocolVersion::TLSv1_2) {
            true => Some(SignatureScheme::read(r)?),
            false => None,
        };
        let sig = PayloadU16::read(r)?;
        Ok(Self { scheme, sig })
    }
}

/// The body of an ECDHE ServerKeyExchange.
#[derive(Clone, Debug, PartialEq)]
pub struct EcdheServerKeyExchange {
    pub params: ServerEcdhParams,
    pub dss: DigitallySignedStruct,
}

impl EcdheServerKeyExchange {
    pub fn encode(&self, bytes: &mut Vec<u8>) {
        self.params.encode(bytes);
        self.dss.encode(bytes);
    }

    pub fn read(r: &mut Reader<'_>, version: ProtocolVersion) -> Result<Self, InvalidMessage> {
        let params = ServerEcdhParams::read(r)?;
        let dss = DigitallySignedStruct::read(r, version)?;
        r.expect_empty("EcdheServerKeyExchange")?;
        Ok(Self { params, dss })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CertificateRequestPayload {
    pub certtypes: Vec<ClientCertificateType>,
    /// Present only from TLS 1.2.
    pub sigschemes: Option<Vec<SignatureScheme>>,
    pub canames: Vec<PayloadU16>,
}

impl TlsListElement for PayloadU16 {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl CertificateRequestPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.certtypes.encode(bytes);
        if let Some(schemes) = &self.sigschemes {
            schemes.encode(bytes);
        }
        self.canames.encode(bytes);
    }

    fn read(r: &mut Reader<'_>, version: ProtocolVersion) -> Result<Self, InvalidMessage> {
        let certtypes = Vec::read(r)?;
        let sigschemes = match version.at_least(ProtocolVersion::TLSv1_2) {
            true => Some(Vec::read(r)?),
            false => None,
        };
        let canames = Vec::read(r)?;

        if sigschemes
            .as_ref()
            .is_some_and(|s| s.is_empty())
        {
            return Err(InvalidMessage::UnexpectedMessage(
                "CertificateRequest without signature schemes",
            ));
        }

        Ok(Self {
            certtypes,
            sigschemes,
            canames,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewSessionTicketPayload {
    pub lifetime_hint: u32,
    pub ticket: PayloadU16,
}

impl NewSessionTicketPayload {
    pub fn new(lifetime_hint: u32, ticket: Vec<u8>) -> Self {
        Self {
            lifetime_hint,
            ticket: PayloadU16::new(ticket),
        }
    }
}

impl Codec<'_> for NewSessionTicketPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.lifetime_hint.encode(bytes);
        self.ticket.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let lifetime_hint = u32::read(r)?;
        let ticket = PayloadU16::read(r)?;

        Ok(Self {
            lifetime_hint,
            ticket,
        })
    }
}

/// CertificateStatus carrying a DER OCSPResponse.
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateStatus {
    pub ocsp_response: PayloadU24,
}

impl Codec<'_> for CertificateStatus {
    fn encode(&self, bytes: &mut Vec<u8>) {
        CertificateStatusType::OCSP.encode(bytes);
        self.ocsp_response.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = CertificateStatusType::read(r)?;

        match typ {
            CertificateStatusType::OCSP => Ok(Self {
                ocsp_response: PayloadU24::read(r)?,
            }),
            _ => Err(InvalidMessage::InvalidCertificateStatusType),
        }
    }
}

impl CertificateStatus {
    pub fn new(ocsp: Vec<u8>) -> Self {
        Self {
            ocsp_response: PayloadU24(ocsp),
        }
    }
}

/// NPN's NextProtocol message: the selection plus padding to a 32-byte
/// boundary so the length does not reveal the protocol.
#[derive(Clone, Debug, PartialEq)]
pub struct NextProtocolPayload {
    pub proto: PayloadU8,
    pub padding: PayloadU8,
}

impl NextProtocolPayload {
    pub fn new(proto: &[u8]) -> Self {
        let padding_len = 32 - (proto.len() + 2) % 32;
        Self {
            proto: PayloadU8::new(proto.to_vec()),
            padding: PayloadU8::new(vec![0u8; padding_len]),
        }
    }
}

impl Codec<'_> for NextProtocolPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.proto.encode(bytes);
        self.padding.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let proto = PayloadU8::read(r)?;
        let padding = PayloadU8::read(r)?;
        Ok(Self { proto, padding })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HandshakePayload {
    HelloRequest,
    ClientHello(ClientHelloPayload),
    ServerHello(ServerHelloPayload),
    Certificate(Vec<CertificateDer<'static>>),
    /// Interpreted once the key exchange algorithm is known.
    ServerKeyExchange(Payload),
    CertificateRequest(CertificateRequestPayload),
    ServerHelloDone,
    /// Interpreted once the key exchange algorithm is known.
    ClientKeyExchange(Payload),
    CertificateVerify(DigitallySignedStruct),
    NewSessionTicket(NewSessionTicketPayload),
    CertificateStatus(CertificateStatus),
    NextProtocol(NextProtocolPayload),
    Finished(Payload),
    Unknown(Payload),
}

impl HandshakePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        use self::HandshakePayload::*;
        match self {
            HelloRequest | ServerHelloDone => {}
            ClientHello(x) => x.encode(bytes),
            ServerHello(x) => x.encode(bytes),
            Certificate(x) => x.encode(bytes),
            ServerKeyExchange(x) => x.encode(bytes),
            CertificateRequest(x) => x.encode(bytes),
            ClientKeyExchange(x) => x.encode(bytes),
            CertificateVerify(x) => x.encode(bytes),
            NewSessionTicket(x) => x.encode(bytes),
            CertificateStatus(x) => x.encode(bytes),
            NextProtocol(x) => x.encode(bytes),
            Finished(x) => x.encode(bytes),
            Unknown(x) => x.encode(bytes),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandshakeMessagePayload {
    pub typ: HandshakeType,
    pub payload: HandshakePayload,
}

impl Codec<'_> for HandshakeMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        // output type, length, and encoded payload
        self.typ.encode(bytes);

        let nested = LengthPrefixedBuffer::new(ListLength::U24 { max: usize::MAX }, bytes);
        self.payload.encode(nested.buf);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Self::read_version(r, ProtocolVersion::TLSv1_2)
    }
}

impl HandshakeMessagePayload {
    /// Decodes one handshake message.  CertificateRequest and
    /// CertificateVerify bodies differ before TLS 1.2, hence `vers`.
    pub fn read_version(r: &mut Reader<'_>, vers: ProtocolVersion) -> Result<Self, InvalidMessage> {
        let mut typ = HandshakeType::read(r)?;
        let len = codec::u24::read(r)?.0;
        if len > MAX_HANDSHAKE_SIZE {
            return Err(InvalidMessage::HandshakePayloadTooLarge);
        }
        let mut sub = r.sub(len as usize)?;

        let payload = match typ {
            HandshakeType::HelloRequest if sub.left() == 0 => HandshakePayload::HelloRequest,
            HandshakeType::ClientHello => {
                HandshakePayload::ClientHello(ClientHelloPayload::read(&mut sub)?)
            }
            HandshakeType::ServerHello => {
                HandshakePayload::ServerHello(ServerHelloPayload::read(&mut sub)?)
            }
            HandshakeType::Certificate => HandshakePayload::Certificate(Vec::read(&mut sub)?),
            HandshakeType::ServerKeyExchange => {
                HandshakePayload::ServerKeyExchange(Payload::read(&mut sub))
            }
            HandshakeType::ServerHelloDone => {
                sub.expect_empty("ServerHelloDone")?;
                HandshakePayload::ServerHelloDone
            }
            HandshakeType::ClientKeyExchange => {
                HandshakePayload::ClientKeyExchange(Payload::read(&mut sub))
            }
            HandshakeType::CertificateRequest => HandshakePayload::CertificateRequest(
                CertificateRequestPayload::read(&mut sub, vers)?,
            ),
            HandshakeType::CertificateVerify => HandshakePayload::CertificateVerify(
                DigitallySignedStruct::read(&mut sub, vers)?,
            ),
            HandshakeType::NewSessionTicket => {
                HandshakePayload::NewSessionTicket(NewSessionTicketPayload::read(&mut sub)?)
            }
            HandshakeType::CertificateStatus => {
                HandshakePayload::CertificateStatus(CertificateStatus::read(&mut sub)?)
            }
            HandshakeType::NextProtocol => {
                HandshakePayload::NextProtocol(NextProtocolPayload::read(&mut sub)?)
            }
            HandshakeType::Finished => HandshakePayload::Finished(Payload::read(&mut sub)),
            _ => {
                // not legal on wire
                typ = HandshakeType::Unknown(typ.into());
                HandshakePayload::Unknown(Payload::read(&mut sub))
            }
        };

        sub.expect_empty("HandshakePayload")
            .map(|_| Self { typ, payload })
    }

    pub fn build(typ: HandshakeType, payload: HandshakePayload) -> Self {
        Self { typ, payload }
    }
}
