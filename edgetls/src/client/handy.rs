use std::sync::Mutex;

use crate::client;
use crate::limited_cache;
use crate::msgs::persist::ClientSessionValue;

/// An implementer of `ClientSessionCache` which does nothing.
#[derive(Debug)]
pub struct NoClientSessionStorage {}

impl client::ClientSessionCache for NoClientSessionStorage {
    fn put(&self, _server_name: &str, _value: ClientSessionValue) {}

    fn get(&self, _server_name: &str) -> Option<ClientSessionValue> {
        None
    }

    fn remove(&self, _server_name: &str) {}
}

/// An implementer of `ClientSessionCache` that stores everything
/// in memory.
///
/// It enforces a limit on the number of entries to bound memory usage.
pub struct ClientSessionMemoryCache {
    servers: Mutex<limited_cache::LimitedCache<String, ClientSessionValue>>,
}

impl ClientSessionMemoryCache {
    /// Make a new ClientSessionMemoryCache.  `size` is the
    /// maximum number of stored sessions.
    pub fn new(size: usize) -> Self {
        Self {
            servers: Mutex::new(limited_cache::LimitedCache::new(size)),
        }
    }
}

impl client::ClientSessionCache for ClientSessionMemoryCache {
    fn put(&self, server_name: &str, value: ClientSessionValue) {
        if let Ok(mut servers) = self.servers.lock() {
            servers.insert(server_name.to_owned(), value);
        }
    }

    fn get(&self, server_name: &str) -> Option<ClientSessionValue> {
        self.servers
            .lock()
            .ok()?
            .get(server_name)
            .cloned()
    }

    fn remove(&self, server_name: &str) {
        if let Ok(mut servers) = self.servers.lock() {
            servers.remove(server_name);
        }
    }
}

impl std::fmt::Debug for ClientSessionMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Note: we omit self.servers as it may contain sensitive data.
        f.debug_struct("ClientSessionMemoryCache")
            .finish_non_exhaustive()
    }
}
