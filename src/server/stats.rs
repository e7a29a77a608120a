//! Connection-wide diagnostics counters, the SMB2 counterpart of
//! `tmthecoder-smb`'s `SMBServerDiagnostics`: a handful of running totals a
//! server operator can poll without taking any lock a request handler might
//! be waiting on.
//!
//! Where the teacher's diagnostics struct batches updates through a builder
//! under an `RwLock`, these counters are plain atomics bumped in place by
//! [`crate::server::connection`] as connections come and go; a snapshot is a
//! relaxed load of each one, so polling never contends with request traffic.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for one [`crate::server::connection::Server`].
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_accepted: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    auth_failures: AtomicU64,
}

/// A point-in-time copy of [`ServerStats`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    pub connections_accepted: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub auth_failures: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        ServerStats::default()
    }

    pub fn on_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn on_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn on_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = ServerStats::new();
        assert_eq!(stats.snapshot(), ServerStatsSnapshot::default());
    }

    #[test]
    fn accepted_and_traffic_counters_accumulate() {
        let stats = ServerStats::new();
        stats.on_connection_accepted();
        stats.on_connection_accepted();
        stats.on_bytes_in(100);
        stats.on_bytes_out(40);
        stats.on_auth_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.connections_accepted, 2);
        assert_eq!(snap.bytes_in, 100);
        assert_eq!(snap.bytes_out, 40);
        assert_eq!(snap.auth_failures, 1);
    }
}
