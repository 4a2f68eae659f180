// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for `libdd-rest-transport`.

use std::io;

use thiserror::Error;

/// Errors surfaced by [`crate::HttpTransport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request method is not one the transport knows how to send.
    ///
    /// Raised before any network activity; never retried.
    #[error("unknown request method {0}")]
    UnknownMethod(String),

    /// The target host, request uri or path does not form a valid URI.
    #[error("invalid target URI {target}")]
    InvalidUri {
        /// The offending host or request, as given by the caller.
        target: String,
        /// What the URI parser rejected.
        #[source]
        source: http::Error,
    },

    /// The target URI uses a scheme other than `http`.
    #[error("unsupported scheme: `{0}`")]
    UnsupportedScheme(String),

    /// The settings cannot produce a working transport.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A network failure that was not retried or that exhausted the retry
    /// ceiling. The underlying error is propagated unmodified.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The transport reached a state that indicates a defect in the
    /// environment or in this crate rather than a transient condition.
    #[error("illegal transport state: {0}")]
    IllegalState(String),
}

impl TransportError {
    pub(crate) fn invalid_uri(target: impl Into<String>, source: impl Into<http::Error>) -> Self {
        Self::InvalidUri {
            target: target.into(),
            source: source.into(),
        }
    }

    /// The underlying IO error, if this is a network failure.
    pub fn as_io(&self) -> Option<&io::Error> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type TransportResult<T> = Result<T, TransportError>;
