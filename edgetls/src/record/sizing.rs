use std::time::{Duration, Instant};

use super::MAX_PLAINTEXT;

/// Application data record size while a connection is warming up.
pub(crate) const INITIAL_RECORD_SIZE: usize = 1024;

/// Application data sent before records grow to the maximum.
const BOOST_THRESHOLD: u64 = 1024 * 1024;

/// Outbound idle time after which records shrink again.
const IDLE_RESET: Duration = Duration::from_secs(1);

/// Chooses how much application data goes into each record.
///
/// Small records let a browser start parsing before a whole 16KB record
/// has arrived; once a connection is busy, full-sized records have less
/// overhead.
#[derive(Debug)]
pub(crate) struct RecordSizer {
    enabled: bool,
    sent: u64,
    last_write: Option<Instant>,
}

impl RecordSizer {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            sent: 0,
            last_write: None,
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// The plaintext limit for the next application data record.
    pub(crate) fn limit(&mut self, now: Instant) -> usize {
        if !self.enabled {
            return MAX_PLAINTEXT;
        }

        if let Some(last) = self.last_write {
            if now.saturating_duration_since(last) >= IDLE_RESET {
                self.sent = 0;
            }
        }

        match self.sent >= BOOST_THRESHOLD {
            true => MAX_PLAINTEXT,
            false => INITIAL_RECORD_SIZE,
        }
    }

    pub(crate) fn sent(&mut self, len: usize, now: Instant) {
        self.sent = self.sent.saturating_add(len as u64);
        self.last_write = Some(now);
    }
}
