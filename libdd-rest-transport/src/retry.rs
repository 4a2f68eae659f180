// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry decision for failed calls.

use std::io;
use std::sync::Arc;

use tracing::debug;

use crate::request::Verb;
use crate::stats::Stats;

/// Decides whether a failed call is attempted again, counting every retry
/// it grants in the transport's [`Stats`].
///
/// The baseline decision retries IO failures up to `max_retries` times.
/// Failures that mean the request reached the server, or that the call ran
/// out of time, are never retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    stats: Arc<Stats>,
}

impl RetryPolicy {
    /// A policy allowing `max_retries` re-attempts (not counting the
    /// initial call), recording into `stats`.
    pub fn new(max_retries: u32, stats: Arc<Stats>) -> Self {
        Self { max_retries, stats }
    }

    /// The retry ceiling.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `execution_count` is the number of executions that failed so far,
    /// starting at 1 for the initial call.
    ///
    /// Increments the retry counter exactly once when, and only when, it
    /// returns `true`.
    pub fn should_retry(&self, verb: Verb, error: &io::Error, execution_count: u32) -> bool {
        if !is_retryable(error, execution_count, self.max_retries) {
            return false;
        }
        self.stats.record_retry();
        debug!(
            http.method = %verb,
            attempt = execution_count + 1,
            max_retries = self.max_retries,
            error = %error,
            "Retrying request after IO failure"
        );
        true
    }
}

/// The baseline decision.
pub(crate) fn is_retryable(error: &io::Error, execution_count: u32, max_retries: u32) -> bool {
    if execution_count > max_retries {
        return false;
    }
    !matches!(
        error.kind(),
        // out of time or interrupted
        io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            // unknown host
            | io::ErrorKind::NotFound
            // the request reached the server and the exchange broke afterwards
            | io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::Unsupported
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(kind: io::ErrorKind) -> io::Error {
        io::Error::new(kind, "test")
    }

    #[test]
    fn retries_transient_failures_within_ceiling() {
        for kind in [
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::NotConnected,
        ] {
            assert!(is_retryable(&err(kind), 1, 3), "{kind:?}");
            assert!(is_retryable(&err(kind), 3, 3), "{kind:?}");
        }
    }

    #[test]
    fn stops_past_ceiling() {
        assert!(!is_retryable(&err(io::ErrorKind::ConnectionReset), 4, 3));
        assert!(!is_retryable(&err(io::ErrorKind::ConnectionReset), 1, 0));
    }

    #[test]
    fn never_retries_timeouts_or_sent_requests() {
        for kind in [
            io::ErrorKind::TimedOut,
            io::ErrorKind::Interrupted,
            io::ErrorKind::NotFound,
            io::ErrorKind::InvalidData,
        ] {
            assert!(!is_retryable(&err(kind), 1, 3), "{kind:?}");
        }
    }

    #[test]
    fn counts_only_granted_retries() {
        let stats = Arc::new(Stats::default());
        let policy = RetryPolicy::new(2, Arc::clone(&stats));

        assert!(policy.should_retry(Verb::Get, &err(io::ErrorKind::ConnectionReset), 1));
        assert!(!policy.should_retry(Verb::Get, &err(io::ErrorKind::TimedOut), 2));
        assert!(policy.should_retry(Verb::Get, &err(io::ErrorKind::ConnectionReset), 2));
        assert!(!policy.should_retry(Verb::Get, &err(io::ErrorKind::ConnectionReset), 3));

        assert_eq!(stats.snapshot().retry_count, 2);
    }

    #[test]
    fn evaluation_alone_does_not_count() {
        let stats = Arc::new(Stats::default());
        let policy = RetryPolicy::new(0, Arc::clone(&stats));
        for _ in 0..5 {
            assert!(!policy.should_retry(Verb::Post, &err(io::ErrorKind::BrokenPipe), 1));
        }
        assert_eq!(stats.snapshot().retry_count, 0);
        assert_eq!(policy.max_retries(), 0);
    }
}
