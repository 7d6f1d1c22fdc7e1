use std::error::Error as StdError;
use std::fmt;

use crate::enums::{AlertDescription, ContentType, HandshakeType, ProtocolVersion};

/// edgetls reports protocol errors using this type.
#[non_exhaustive]
#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    /// We received a TLS message that isn't valid right now.
    /// `expect_types` lists the message types we can expect right now.
    /// `got_type` is the type we found.
    InappropriateMessage {
        /// Which types we expected
        expect_types: Vec<ContentType>,
        /// What type we received
        got_type: ContentType,
    },

    /// We received a TLS handshake message that isn't valid right now.
    /// `expect_types` lists the handshake message types we can expect
    /// right now.  `got_type` is the type we found.
    InappropriateHandshakeMessage {
        /// Which handshake type we expected
        expect_types: Vec<HandshakeType>,
        /// What handshake type we received
        got_type: HandshakeType,
    },

    /// The peer sent us a TLS message with invalid contents.
    InvalidMessage(InvalidMessage),

    /// The peer didn't give us any certificates.
    NoCertificatesPresented,

    /// A record failed its MAC, padding or AEAD check.  The cause is
    /// deliberately not recorded.
    DecryptError,

    /// We couldn't encrypt a message.
    EncryptError,

    /// The 64-bit record sequence number of one direction would wrap.
    SequenceNumberExhausted,

    /// The peer doesn't support a protocol version/feature we require.
    /// The parameter gives a hint as to what version/feature it is.
    PeerIncompatible(PeerIncompatible),

    /// The peer deviated from the standard TLS protocol.
    /// The parameter gives a hint where.
    PeerMisbehaved(PeerMisbehaved),

    /// We received a fatal alert.  This means the peer is unhappy.
    AlertReceived(AlertDescription),

    /// We saw an invalid certificate.
    InvalidCertificate(CertificateError),

    /// The peer sent an oversized record.
    PeerSentOversizedRecord,

    /// This function doesn't work until the TLS handshake is complete.
    HandshakeNotComplete,

    /// The connection was closed by `close()` or by the peer's
    /// close_notify, and can't carry more data.
    ConnectionClosed,

    /// A configuration value was rejected when building it.
    InvalidConfig(String),

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// We failed to figure out what time it currently is.
    FailedToGetCurrentTime,

    /// A catch-all error for unlikely errors.
    General(String),
}

impl Error {
    /// The alert we send when this error ends a connection and no
    /// more specific alert was chosen where it was raised.
    pub(crate) fn alert(&self) -> Option<AlertDescription> {
        Some(match self {
            Self::InappropriateMessage { .. } | Self::InappropriateHandshakeMessage { .. } => {
                AlertDescription::UnexpectedMessage
            }
            Self::InvalidMessage(_) => AlertDescription::DecodeError,
            Self::NoCertificatesPresented => AlertDescription::BadCertificate,
            Self::DecryptError => AlertDescription::BadRecordMac,
            Self::PeerSentOversizedRecord => AlertDescription::RecordOverflow,
            Self::PeerIncompatible(PeerIncompatible::UnsupportedProtocolVersion(_))
            | Self::PeerIncompatible(PeerIncompatible::VersionBelowGradeFloor) => {
                AlertDescription::ProtocolVersion
            }
            Self::PeerIncompatible(_) => AlertDescription::HandshakeFailure,
            Self::PeerMisbehaved(why) => why.alert(),
            Self::InvalidCertificate(e) => e.clone().into(),
            Self::AlertReceived(_) | Self::ConnectionClosed => return None,
            Self::EncryptError
            | Self::SequenceNumberExhausted
            | Self::HandshakeNotComplete
            | Self::InvalidConfig(_)
            | Self::FailedToGetRandomBytes
            | Self::FailedToGetCurrentTime
            | Self::General(_) => AlertDescription::InternalError,
        })
    }
}

/// A corrupt TLS message payload that resulted in an error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidMessage {
    /// An advertised message was larger then expected.
    HandshakePayloadTooLarge,
    /// The peer sent us a syntactically incorrect ChangeCipherSpec payload.
    InvalidCcs,
    /// An unknown content type was encountered during message decoding.
    InvalidContentType,
    /// A peer sent an invalid certificate status type
    InvalidCertificateStatusType,
    /// A peer's server name could not be decoded
    InvalidServerName,
    /// A stapled OCSP response could not be parsed.
    InvalidOcspResponse,
    /// A message was zero-length when its record kind forbids it.
    InvalidEmptyPayload,
    /// A legacy SSLv2-framed ClientHello was malformed.
    InvalidSslv2Hello,
    /// A ClientKeyExchange could not be interpreted for the chosen suite.
    InvalidKeyExchange,
    /// A TLS message payload was larger than the protocol allows.
    MessageTooLarge,
    /// Message is shorter than the expected length
    MessageTooShort,
    /// Missing data for the named handshake payload value
    MissingData(&'static str),
    /// Trailing data found for the named handshake payload value
    TrailingData(&'static str),
    /// A peer sent an unexpected message type.
    UnexpectedMessage(&'static str),
    /// An unknown TLS protocol was encountered during message decoding.
    UnknownProtocolVersion,
    /// A peer sent an unknown elliptic curve type.
    UnsupportedCurveType,
}

impl From<InvalidMessage> for Error {
    #[inline]
    fn from(e: InvalidMessage) -> Self {
        Self::InvalidMessage(e)
    }
}

#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, PartialEq, Clone)]
/// The set of cases where we failed to make a connection because we thought
/// the peer was misbehaving.
pub enum PeerMisbehaved {
    BadClientKeyExchange,
    DuplicateClientHelloExtensions,
    IncorrectFinished,
    InappropriateFallback,
    InvalidKeyShare,
    InvalidRenegotiationInfo,
    NextProtocolWithoutNegotiation,
    RenegotiationAttempted,
    ResumedWithVariedCipherSuite,
    ResumedWithVariedVersion,
    SelectedUnofferedApplicationProtocol,
    SelectedUnofferedCipherSuite,
    SelectedUnofferedCompression,
    SelectedUnusableCipherSuiteForVersion,
    SignedKxWithWrongAlgorithm,
    UnsolicitedCertificateStatus,
    UnsolicitedServerHelloExtension,
    UnsolicitedSessionTicket,
}

impl PeerMisbehaved {
    fn alert(&self) -> AlertDescription {
        match self {
            Self::IncorrectFinished => AlertDescription::DecryptError,
            Self::InappropriateFallback => AlertDescription::InappropriateFallback,
            Self::RenegotiationAttempted => AlertDescription::NoRenegotiation,
            Self::InvalidRenegotiationInfo => AlertDescription::HandshakeFailure,
            Self::UnsolicitedServerHelloExtension => AlertDescription::UnsupportedExtension,
            Self::UnsolicitedCertificateStatus | Self::UnsolicitedSessionTicket => {
                AlertDescription::UnexpectedMessage
            }
            _ => AlertDescription::IllegalParameter,
        }
    }
}

impl From<PeerMisbehaved> for Error {
    #[inline]
    fn from(e: PeerMisbehaved) -> Self {
        Self::PeerMisbehaved(e)
    }
}

#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, PartialEq, Clone)]
/// The set of cases where we failed to make a connection because a peer
/// doesn't support a TLS version/feature we require.
pub enum PeerIncompatible {
    ClientCertificateRequired,
    NoCipherSuitesInCommon,
    NoKxGroupsInCommon,
    NoSignatureSchemesInCommon,
    NullCompressionRequired,
    Sslv2HelloDisabled,
    UncompressedEcPointsRequired,
    UnsupportedProtocolVersion(ProtocolVersion),
    VersionBelowGradeFloor,
}

impl From<PeerIncompatible> for Error {
    #[inline]
    fn from(e: PeerIncompatible) -> Self {
        Self::PeerIncompatible(e)
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
/// The ways in which certificate validation can fail.
///
/// The protocol code maps each of these onto the alert sent to the peer.
pub enum CertificateError {
    /// The certificate is not correctly encoded.
    BadEncoding,

    /// The current time is after the `notAfter` time in the certificate.
    Expired,

    /// The current time is before the `notBefore` time in the certificate.
    NotValidYet,

    /// The certificate has been revoked.
    Revoked,

    /// The certificate contains an extension marked critical, but it was
    /// not processed by the certificate validator.
    UnhandledCriticalExtension,

    /// The certificate chain is not issued by a known root certificate.
    UnknownIssuer,

    /// A certificate or handshake signature does not verify.
    BadSignature,

    /// The subject names in an end-entity certificate do not include
    /// the expected name.
    NotValidForName,

    /// The certificate is being used for a different purpose than allowed.
    InvalidPurpose,

    /// The certificate carries a key type we cannot use.
    UnsupportedKeyType,

    /// Any other error, as rendered by the validator.
    Other(String),
}

// Mapping follows what OpenSSL and BoringSSL send for the same failures.
impl From<CertificateError> for AlertDescription {
    fn from(e: CertificateError) -> Self {
        use CertificateError::*;
        match e {
            BadEncoding | UnhandledCriticalExtension | NotValidForName => Self::BadCertificate,
            Expired | NotValidYet => Self::CertificateExpired,
            Revoked => Self::CertificateRevoked,
            UnknownIssuer => Self::UnknownCA,
            BadSignature => Self::DecryptError,
            InvalidPurpose | UnsupportedKeyType => Self::UnsupportedCertificate,
            Other(_) => Self::CertificateUnknown,
        }
    }
}

impl From<CertificateError> for Error {
    #[inline]
    fn from(e: CertificateError) -> Self {
        Self::InvalidCertificate(e)
    }
}

fn join<T: fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|x| format!("{:?}", x))
        .collect::<Vec<String>>()
        .join(" or ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::InappropriateMessage {
                ref expect_types,
                ref got_type,
            } => write!(
                f,
                "received unexpected message: got {:?} when expecting {}",
                got_type,
                join::<ContentType>(expect_types)
            ),
            Self::InappropriateHandshakeMessage {
                ref expect_types,
                ref got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {:?} when expecting {}",
                got_type,
                join::<HandshakeType>(expect_types)
            ),
            Self::InvalidMessage(ref typ) => {
                write!(f, "received corrupt message of type {:?}", typ)
            }
            Self::PeerIncompatible(ref why) => write!(f, "peer is incompatible: {:?}", why),
            Self::PeerMisbehaved(ref why) => write!(f, "peer misbehaved: {:?}", why),
            Self::AlertReceived(ref alert) => write!(f, "received fatal alert: {:?}", alert),
            Self::InvalidCertificate(ref err) => {
                write!(f, "invalid peer certificate: {:?}", err)
            }
            Self::NoCertificatesPresented => write!(f, "peer sent no certificates"),
            Self::DecryptError => write!(f, "cannot decrypt peer's message"),
            Self::EncryptError => write!(f, "cannot encrypt message"),
            Self::SequenceNumberExhausted => write!(f, "record sequence number exhausted"),
            Self::PeerSentOversizedRecord => write!(f, "peer sent excess record size"),
            Self::HandshakeNotComplete => write!(f, "handshake not complete"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::InvalidConfig(ref why) => write!(f, "invalid configuration: {}", why),
            Self::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Self::FailedToGetCurrentTime => write!(f, "failed to get current time"),
            Self::General(ref err) => write!(f, "unexpected error: {}", err),
        }
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_error_alerts() {
        assert_eq!(
            AlertDescription::from(CertificateError::Revoked),
            AlertDescription::CertificateRevoked
        );
        assert_eq!(
            AlertDescription::from(CertificateError::UnknownIssuer),
            AlertDescription::UnknownCA
        );
        assert_eq!(
            AlertDescription::from(CertificateError::UnsupportedKeyType),
            AlertDescription::UnsupportedCertificate
        );
    }

    #[test]
    fn default_alerts() {
        assert_eq!(
            Error::DecryptError.alert(),
            Some(AlertDescription::BadRecordMac)
        );
        assert_eq!(
            Error::from(PeerIncompatible::VersionBelowGradeFloor).alert(),
            Some(AlertDescription::ProtocolVersion)
        );
        assert_eq!(
            Error::from(PeerMisbehaved::InappropriateFallback).alert(),
            Some(AlertDescription::InappropriateFallback)
        );
        assert_eq!(
            Error::from(InvalidMessage::MessageTooShort).alert(),
            Some(AlertDescription::DecodeError)
        );
        assert_eq!(Error::AlertReceived(AlertDescription::CloseNotify).alert(), None);
    }

    #[test]
    fn smoke() {
        let all = vec![
            Error::InappropriateMessage {
                expect_types: vec![ContentType::Alert],
                got_type: ContentType::Handshake,
            },
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeType::ClientHello, HandshakeType::Finished],
                got_type: HandshakeType::ServerHelloDone,
            },
            Error::InvalidMessage(InvalidMessage::InvalidCcs),
            Error::NoCertificatesPresented,
            Error::DecryptError,
            Error::SequenceNumberExhausted,
            Error::PeerIncompatible(PeerIncompatible::Sslv2HelloDisabled),
            Error::PeerMisbehaved(PeerMisbehaved::RenegotiationAttempted),
            Error::AlertReceived(AlertDescription::ExportRestriction),
            Error::InvalidCertificate(CertificateError::Expired),
            Error::General("undocumented error".to_string()),
            Error::InvalidConfig("priorities".to_string()),
            Error::ConnectionClosed,
        ];

        for err in all {
            println!("{:?}:", err);
            println!("  fmt '{}'", err);
        }
    }
}
