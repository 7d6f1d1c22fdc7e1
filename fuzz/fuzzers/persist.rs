#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate edgetls;

use edgetls::internal::msgs::codec::Codec;
use edgetls::SessionState;

fuzz_target!(|data: &[u8]| {
    if let Ok(state) = SessionState::read_bytes(data) {
        let enc = state.get_encoding();
        let again = SessionState::read_bytes(&enc).unwrap();
        assert_eq!(again.get_encoding(), enc);
    }
});
