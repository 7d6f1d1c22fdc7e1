#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate edgetls;

use edgetls::internal::msgs::codec::{Codec, Reader};
use edgetls::internal::msgs::handshake::HandshakeMessagePayload;
use edgetls::ProtocolVersion;

fuzz_target!(|data: &[u8]| {
    for version in [
        ProtocolVersion::SSLv3,
        ProtocolVersion::TLSv1_0,
        ProtocolVersion::TLSv1_2,
    ] {
        let mut rdr = Reader::init(data);
        let Ok(hs) = HandshakeMessagePayload::read_version(&mut rdr, version) else {
            continue;
        };

        // what we emit must read back the same
        let enc = hs.get_encoding();
        let mut rdr = Reader::init(&enc);
        let again = HandshakeMessagePayload::read_version(&mut rdr, version).unwrap();
        assert_eq!(again.get_encoding(), enc);
    }
});
