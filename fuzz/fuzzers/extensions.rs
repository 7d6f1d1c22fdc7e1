#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate edgetls;

use edgetls::internal::msgs::codec::{Codec, Reader};
use edgetls::internal::msgs::handshake::{ClientExtension, ServerExtension};

fuzz_target!(|data: &[u8]| {
    let _ = Vec::<ClientExtension>::read(&mut Reader::init(data));
    let _ = Vec::<ServerExtension>::read(&mut Reader::init(data));
});
