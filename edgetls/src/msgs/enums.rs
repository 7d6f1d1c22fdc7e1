#![allow(non_camel_case_types)]
use crate::msgs::codec::{Codec, Reader};

enum_builder! {
    /// The `AlertLevel` TLS protocol enum.  Values in this enum are taken
    /// from the various RFCs covering TLS, and are listed by IANA.
    /// The `Unknown` item is used when processing unrecognised ordinals.
    #[repr(u8)]
    pub enum AlertLevel {
        Warning => 0x01,
        Fatal => 0x02,
    }
}

enum_builder! {
    #[repr(u8)]
    pub enum Compression {
        Null => 0x00,
        Deflate => 0x01,
    }
}

enum_builder! {
    /// The `ExtensionType` TLS protocol enum.  Values in this enum are taken
    /// from the various RFCs covering TLS, and are listed by IANA.
    /// The `Unknown` item is used when processing unrecognised ordinals.
    #[repr(u16)]
    pub enum ExtensionType {
        ServerName => 0x0000,
        StatusRequest => 0x0005,
        EllipticCurves => 0x000a,
        ECPointFormats => 0x000b,
        SignatureAlgorithms => 0x000d,
        ALProtocolNegotiation => 0x0010,
        Padding => 0x0015,
        ExtendedMasterSecret => 0x0017,
        SessionTicket => 0x0023,
        NextProtocolNegotiation => 0x3374,
        RenegotiationInfo => 0xff01,
    }
}

enum_builder! {
    #[repr(u8)]
    pub enum ServerNameType {
        HostName => 0x00,
    }
}

enum_builder! {
    /// The `NamedGroup` TLS protocol enum (formerly `NamedCurve`).
    /// The `Unknown` item is used when processing unrecognised ordinals.
    #[repr(u16)]
    pub enum NamedGroup {
        secp256r1 => 0x0017,
        secp384r1 => 0x0018,
        secp521r1 => 0x0019,
        X25519 => 0x001d,
    }
}

enum_builder! {
    #[repr(u8)]
    pub enum ECPointFormat {
        Uncompressed => 0x00,
        ANSIX962CompressedPrime => 0x01,
        ANSIX962CompressedChar2 => 0x02,
    }
}

enum_builder! {
    #[repr(u8)]
    pub enum ECCurveType {
        ExplicitPrime => 0x01,
        ExplicitChar2 => 0x02,
        NamedCurve => 0x03,
    }
}

enum_builder! {
    #[repr(u8)]
    pub enum ClientCertificateType {
        RSASign => 0x01,
        DSSSign => 0x02,
        ECDSASign => 0x40,
    }
}

enum_builder! {
    #[repr(u8)]
    pub enum CertificateStatusType {
        OCSP => 0x01,
    }
}

/// True for the GREASE code points (`0x?a?a`) clients sprinkle into
/// their lists; they carry no meaning and are left out of fingerprints.
pub(crate) fn is_grease(value: u16) -> bool {
    value & 0x0f0f == 0x0a0a && value >> 8 == value & 0xff
}
