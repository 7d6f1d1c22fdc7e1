#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate edgetls;

use std::io;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use edgetls::{CertifiedKey, Conn, ServerConfig, Transport};

/// Reads the fuzz input, discards whatever the server sends.
struct Input(Mutex<io::Cursor<Vec<u8>>>);

impl Transport for Input {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut cursor = self
            .0
            .lock()
            .map_err(|_| io::ErrorKind::Other)?;
        io::Read::read(&mut *cursor, buf)
    }

    fn write_all(&self, _: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn set_read_timeout(&self, _: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn set_write_timeout(&self, _: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

fn config() -> Arc<ServerConfig> {
    static CONFIG: OnceLock<Arc<ServerConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let key = CertifiedKey::from_pem_files(
                concat!(env!("CARGO_MANIFEST_DIR"), "/../test-ca/ecdsa/end.fullchain"),
                concat!(env!("CARGO_MANIFEST_DIR"), "/../test-ca/ecdsa/end.key"),
            )
            .unwrap();
            let mut config = ServerConfig::new(vec![Arc::new(key)]);
            config.accept_sslv2_hello = true;
            Arc::new(config)
        })
        .clone()
}

fuzz_target!(|data: &[u8]| {
    let conn = Conn::server(Input(Mutex::new(io::Cursor::new(data.to_vec()))), config());
    let _ = conn.handshake();
});
