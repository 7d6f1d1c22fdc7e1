use std::env::var_os;
use std::ffi::OsString;
use std::fmt::{self, Debug, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;

use crate::log::warn;

/// This trait represents the ability to do something useful
/// with key material, such as logging it to a file for debugging.
///
/// Naturally, secrets passed over the interface are *extremely*
/// sensitive and can break the security of past, present and
/// future sessions.
///
/// See [`KeyLogFile`] that implements the standard
/// `SSLKEYLOGFILE` environment variable behaviour.
pub trait KeyLog: Debug + Send + Sync {
    /// Log the master secret of a completed handshake, identified by
    /// the connection's `client_random`.
    fn log(&self, client_random: &[u8; 32], master_secret: &[u8; 48]);
}

/// KeyLog that does exactly nothing.
#[derive(Debug)]
pub struct NoKeyLog;

impl KeyLog for NoKeyLog {
    fn log(&self, _: &[u8; 32], _: &[u8; 48]) {}
}

struct KeyLogFileInner {
    file: Option<File>,
    buf: Vec<u8>,
}

impl KeyLogFileInner {
    fn new(path: Option<OsString>) -> Self {
        let Some(path) = &path else {
            return Self {
                file: None,
                buf: Vec::new(),
            };
        };

        #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
        let file = match OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
        {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("unable to create key log file {:?}: {}", path, e);
                None
            }
        };

        Self {
            file,
            buf: Vec::new(),
        }
    }

    /// Writes one NSS key log line:
    /// `CLIENT_RANDOM <client_random hex> <master_secret hex>`.
    fn try_write(&mut self, client_random: &[u8], master_secret: &[u8]) -> io::Result<()> {
        let Some(file) = &mut self.file else {
            return Ok(());
        };

        self.buf.clear();
        write!(self.buf, "CLIENT_RANDOM ")?;
        for b in client_random {
            write!(self.buf, "{:02x}", b)?;
        }
        write!(self.buf, " ")?;
        for b in master_secret {
            write!(self.buf, "{:02x}", b)?;
        }
        writeln!(self.buf)?;
        file.write_all(&self.buf)
    }
}

impl Debug for KeyLogFileInner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLogFileInner")
            // buf may hold key material
            .field("file", &self.file)
            .finish()
    }
}

/// [`KeyLog`] implementation that opens a file whose name is
/// given by the `SSLKEYLOGFILE` environment variable, and writes
/// keys into it.
///
/// If `SSLKEYLOGFILE` is not set, this does nothing.
///
/// If such a file cannot be opened, or cannot be written then
/// this does nothing but logs errors at warning-level.
pub struct KeyLogFile(Mutex<KeyLogFileInner>);

impl KeyLogFile {
    /// Makes a new `KeyLogFile`.  The environment variable is
    /// inspected and the named file is opened during this call.
    pub fn new() -> Self {
        Self::with_path(var_os("SSLKEYLOGFILE"))
    }

    /// Makes a `KeyLogFile` appending to `path`, or doing nothing when
    /// `path` is `None`.
    pub fn with_path(path: Option<OsString>) -> Self {
        Self(Mutex::new(KeyLogFileInner::new(path)))
    }
}

impl KeyLog for KeyLogFile {
    fn log(&self, client_random: &[u8; 32], master_secret: &[u8; 48]) {
        let Ok(mut inner) = self.0.lock() else {
            return;
        };

        #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
        match inner.try_write(client_random, master_secret) {
            Ok(()) => {}
            Err(e) => {
                warn!("error writing to key log file: {}", e);
            }
        }
    }
}

impl Debug for KeyLogFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Ok(key_log_file) => write!(f, "{:?}", key_log_file),
            Err(_) => write!(f, "KeyLogFile {{ <locked> }}"),
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder()
            .is_test(true)
            .try_init();
    }

    #[test]
    fn test_env_var_is_not_set() {
        init();
        let mut inner = KeyLogFileInner::new(None);
        assert!(inner
            .try_write(b"random", b"secret")
            .is_ok());
    }

    #[test]
    fn test_env_var_cannot_be_opened() {
        init();
        let mut inner = KeyLogFileInner::new(Some("/dev/does-not-exist".into()));
        assert!(inner
            .try_write(b"random", b"secret")
            .is_ok());
    }

    #[test]
    fn test_env_var_cannot_be_written() {
        init();
        let mut inner = KeyLogFileInner::new(Some("/dev/full".into()));
        assert!(inner
            .try_write(b"random", b"secret")
            .is_err());
    }

    #[test]
    fn writes_nss_client_random_lines() {
        init();
        let path = std::env::temp_dir().join(format!("edgetls-keylog-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let log = KeyLogFile::with_path(Some(path.clone().into_os_string()));
        log.log(&[0xab; 32], &[0x01; 48]);

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(
            written,
            format!("CLIENT_RANDOM {} {}\n", "ab".repeat(32), "01".repeat(48))
        );
    }
}
