use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::crypto::sign::CertifiedKey;
use crate::error::Error;
use crate::limited_cache;
use crate::log::debug;
use crate::server;

/// Something which never stores sessions.
#[derive(Debug)]
pub struct NoServerSessionStorage {}

impl server::StoresServerSessions for NoServerSessionStorage {
    fn put(&self, _id: Vec<u8>, _sec: Vec<u8>) -> bool {
        false
    }
    fn get(&self, _id: &[u8]) -> Option<Vec<u8>> {
        None
    }
    fn can_cache(&self) -> bool {
        false
    }
}

/// An implementer of `StoresServerSessions` that stores everything
/// in memory.  It enforces a limit on the number of stored sessions
/// to bound memory usage.
pub struct ServerSessionMemoryCache {
    cache: Mutex<limited_cache::LimitedCache<Vec<u8>, Vec<u8>>>,
}

impl ServerSessionMemoryCache {
    /// Make a new ServerSessionMemoryCache.  `size` is the maximum
    /// number of stored sessions, and may be rounded-up for
    /// efficiency.
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            cache: Mutex::new(limited_cache::LimitedCache::new(size)),
        })
    }
}

impl server::StoresServerSessions for ServerSessionMemoryCache {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        match self.cache.lock() {
            Ok(mut cache) => {
                cache.insert(key, value);
                true
            }
            Err(_) => false,
        }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    fn can_cache(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for ServerSessionMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSessionMemoryCache")
            .finish_non_exhaustive()
    }
}

/// Something which never produces tickets.
#[derive(Debug)]
pub(super) struct NeverProducesTickets {}

impl server::ProducesTickets for NeverProducesTickets {
    fn enabled(&self) -> bool {
        false
    }
    fn lifetime(&self) -> u32 {
        0
    }
    fn encrypt(&self, _bytes: &[u8]) -> Option<Vec<u8>> {
        None
    }
    fn decrypt(&self, _bytes: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

/// Loads `<dir>/<name>.fullchain` and `<dir>/<name>.key`, plus
/// `<dir>/<name>.ocsp` when present.
#[derive(Clone, Debug)]
pub struct PemKeyPairLoader {
    /// Directory holding the PEM files.
    pub dir: PathBuf,
}

impl PemKeyPairLoader {
    /// Loads from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl server::KeyPairLoader for PemKeyPairLoader {
    fn load(&self, name: &str) -> Result<Arc<CertifiedKey>, Error> {
        let path = |ext: &str| self.dir.join(format!("{}.{}", name, ext));

        let mut key = CertifiedKey::from_pem_files(path("fullchain"), path("key"))?;
        if let Ok(ocsp) = std::fs::read(path("ocsp")) {
            debug!("loaded OCSP staple for {}", name);
            key = key.with_ocsp(ocsp);
        }
        Ok(Arc::new(key))
    }
}
