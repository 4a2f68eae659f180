// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Network counters kept per transport instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared between a transport and its retry policy.
///
/// Increment-only and never reset while the transport lives. Relaxed
/// ordering is enough: the values are reported, never used to synchronise.
#[derive(Debug, Default)]
pub struct Stats {
    net_retries: AtomicU64,
    net_total_time_nanos: AtomicU64,
}

impl Stats {
    pub(crate) fn record_retry(&self) {
        self.net_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.net_total_time_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            retry_count: self.net_retries.load(Ordering::Relaxed),
            total_network_time: Duration::from_nanos(
                self.net_total_time_nanos.load(Ordering::Relaxed),
            ),
        }
    }
}

/// Read-only view of [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Number of retries actually taken.
    pub retry_count: u64,
    /// Wall-clock time spent executing calls, including failed ones.
    pub total_network_time: Duration,
}

impl StatsSnapshot {
    /// [`StatsSnapshot::total_network_time`] in whole milliseconds.
    pub fn total_network_time_ms(&self) -> u128 {
        self.total_network_time.as_millis()
    }
}
