// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Request type and verb dispatch for `libdd-rest-transport`.

use std::fmt;

use bytes::Bytes;
use http::Method;

use crate::TransportError;

/// The verbs the transport can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
}

// Indexed by `Verb as usize`.
const BODY_CAPABLE: [bool; 5] = [false, false, false, true, true];

impl Verb {
    /// Whether a request body is attached for this verb. Bodies given with
    /// any other verb are ignored.
    pub const fn is_body_capable(self) -> bool {
        BODY_CAPABLE[self as usize]
    }

    pub(crate) fn as_method(self) -> Method {
        match self {
            Verb::Delete => Method::DELETE,
            Verb::Head => Method::HEAD,
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
        }
    }
}

impl TryFrom<&Method> for Verb {
    type Error = TransportError;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        match *method {
            Method::DELETE => Ok(Verb::Delete),
            Method::HEAD => Ok(Verb::Head),
            Method::GET => Ok(Verb::Get),
            Method::POST => Ok(Verb::Post),
            Method::PUT => Ok(Verb::Put),
            _ => Err(TransportError::UnknownMethod(method.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_method().as_str())
    }
}

/// A single REST call.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method. Only DELETE, HEAD, GET, POST and PUT are accepted.
    pub method: Method,

    /// Absolute target overriding the transport's host, e.g.
    /// `"node-2:9200"` or `"http://node-2:9200"`.
    pub uri: Option<String>,

    /// Path relative to the target. A leading `/` is added when missing.
    pub path: String,

    /// Raw query string, without the leading `?`.
    pub params: Option<String>,

    /// Payload, sent only for body-capable verbs.
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a request against the transport's host, with no query string
    /// and no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            uri: None,
            path: path.into(),
            params: None,
            body: None,
        }
    }

    /// Target an absolute uri instead of the transport's host.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the raw query string.
    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Set the payload.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The uri (or path, when no uri is set) the response is traced back to.
    pub(crate) fn source(&self) -> String {
        match self.uri.as_deref().filter(|uri| !uri.is_empty()) {
            Some(uri) => uri.to_owned(),
            None => self.path.clone(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@[{}][{}]",
            self.method,
            self.uri.as_deref().unwrap_or_default(),
            self.path
        )?;
        if let Some(params) = &self.params {
            write!(f, "?{params}")?;
        }
        Ok(())
    }
}

/// Add `http://` to a target that carries no scheme separator.
pub(crate) fn prefix_uri(uri: &str) -> String {
    if uri.contains("://") {
        uri.to_owned()
    } else {
        format!("http://{uri}")
    }
}

/// Make a path absolute.
pub(crate) fn prefix_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}
