//! The library's source of time.

use core::fmt::Debug;
use std::time::{Duration, SystemTime};

use pki_types::UnixTime;

/// An object that provides the current time.
///
/// This is used to check if a certificate has expired during
/// certificate validation, and whether a stapled OCSP response is
/// still fresh.
pub trait TimeProvider: Debug + Send + Sync {
    /// Returns the current wall time.
    ///
    /// This is not required to be monotonic.
    ///
    /// Return `None` if unable to retrieve the time.
    fn current_time(&self) -> Option<UnixTime>;
}

/// Default `TimeProvider` implementation that uses `std`
#[derive(Debug)]
pub struct DefaultTimeProvider;

impl TimeProvider for DefaultTimeProvider {
    fn current_time(&self) -> Option<UnixTime> {
        Some(UnixTime::now())
    }
}

/// A `TimeProvider` stuck at one instant.  Useful for tests and for
/// replaying captured handshakes.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeProvider(pub UnixTime);

impl FixedTimeProvider {
    /// Fixes the time at `secs` after the Unix epoch.
    pub fn from_secs(secs: u64) -> Self {
        Self(UnixTime::since_unix_epoch(Duration::from_secs(secs)))
    }
}

impl TimeProvider for FixedTimeProvider {
    fn current_time(&self) -> Option<UnixTime> {
        Some(self.0)
    }
}

pub(crate) fn to_system_time(t: UnixTime) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(t.as_secs())
}
