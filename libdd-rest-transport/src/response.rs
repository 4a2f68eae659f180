// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Response type for `libdd-rest-transport`.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use tokio::runtime::Runtime;

use crate::connection::{timed_out, to_io_error, ConnectionLease};

/// The outcome of one [`crate::HttpTransport::execute`] call.
#[derive(Debug)]
pub struct Response {
    /// HTTP status code (e.g. 200, 404, 503).
    pub status_code: u16,

    /// Response payload. Must be closed (or dropped) to release the
    /// connection it is read from.
    pub body: ResponseBody,

    /// The request's uri, or its path when no uri was given.
    pub source_uri: String,
}

/// A response payload, either held in memory or streamed from the socket.
///
/// Implements [`Read`]. Only in-memory bodies are reusable: see
/// [`ResponseBody::copy`].
pub struct ResponseBody {
    source: Source,
    lease: Option<ConnectionLease>,
}

enum Source {
    Buffered { bytes: Bytes, position: usize },
    Streaming(Streaming),
    Closed,
}

struct Streaming {
    body: Incoming,
    pending: Bytes,
    runtime: Arc<Runtime>,
    read_timeout: Duration,
    finished: bool,
}

impl Streaming {
    fn next_chunk(&mut self) -> io::Result<()> {
        let read_timeout = self.read_timeout;
        let body = &mut self.body;
        let frame = self
            .runtime
            .block_on(async { tokio::time::timeout(read_timeout, body.frame()).await })
            .map_err(|_| timed_out("read", read_timeout))?;
        match frame {
            None => self.finished = true,
            Some(frame) => {
                if let Ok(data) = frame.map_err(to_io_error)?.into_data() {
                    self.pending = data;
                }
            }
        }
        Ok(())
    }
}

impl ResponseBody {
    pub(crate) fn buffered(bytes: Bytes, lease: Option<ConnectionLease>) -> Self {
        Self {
            source: Source::Buffered { bytes, position: 0 },
            lease,
        }
    }

    pub(crate) fn streaming(
        body: Incoming,
        runtime: Arc<Runtime>,
        read_timeout: Duration,
        lease: ConnectionLease,
    ) -> Self {
        Self {
            source: Source::Streaming(Streaming {
                body,
                pending: Bytes::new(),
                runtime,
                read_timeout,
                finished: false,
            }),
            lease: Some(lease),
        }
    }

    /// An empty, in-memory body.
    pub fn empty() -> Self {
        Self::buffered(Bytes::new(), None)
    }

    /// Whether the payload is held in memory and can be read again through
    /// [`ResponseBody::copy`].
    pub fn is_reusable(&self) -> bool {
        matches!(self.source, Source::Buffered { .. })
    }

    /// A fresh reader over the whole payload, independent of this body's
    /// read position, or `None` when the body is streamed from the socket.
    pub fn copy(&self) -> Option<Cursor<Bytes>> {
        match &self.source {
            Source::Buffered { bytes, .. } => Some(Cursor::new(bytes.clone())),
            _ => None,
        }
    }

    /// Close the stream, then release the connection.
    ///
    /// A body read to the end returns its connection for reuse; a body
    /// closed early discards it. Calling this again does nothing; dropping
    /// the body has the same effect.
    pub fn close(&mut self) {
        let consumed = match std::mem::replace(&mut self.source, Source::Closed) {
            Source::Buffered { bytes, position } => {
                self.source = Source::Buffered { bytes, position };
                true
            }
            Source::Streaming(stream) => stream.finished && stream.pending.is_empty(),
            Source::Closed => false,
        };
        if let Some(lease) = self.lease.take() {
            lease.finish(consumed);
        }
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Buffered { bytes, position } => {
                let remaining = &bytes[(*position).min(bytes.len())..];
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                *position += n;
                Ok(n)
            }
            Source::Streaming(stream) => {
                while stream.pending.is_empty() && !stream.finished && !buf.is_empty() {
                    stream.next_chunk()?;
                }
                let n = stream.pending.len().min(buf.len());
                stream.pending.copy_to_slice(&mut buf[..n]);
                Ok(n)
            }
            Source::Closed => Err(io::Error::other("attempted read on a closed response body")),
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.source {
            Source::Buffered { bytes, .. } => format!("buffered({} bytes)", bytes.len()),
            Source::Streaming(_) => "streaming".to_owned(),
            Source::Closed => "closed".to_owned(),
        };
        f.debug_struct("ResponseBody")
            .field("source", &state)
            .field("holds_connection", &self.lease.is_some())
            .finish()
    }
}

/// Read `body` to the end, bounding each frame by `read_timeout`.
pub(crate) async fn read_fully(mut body: Incoming, read_timeout: Duration) -> io::Result<Bytes> {
    let mut collected = BytesMut::new();
    loop {
        let frame = tokio::time::timeout(read_timeout, body.frame())
            .await
            .map_err(|_| timed_out("read", read_timeout))?;
        match frame {
            None => return Ok(collected.freeze()),
            Some(frame) => {
                if let Ok(data) = frame.map_err(to_io_error)?.into_data() {
                    collected.extend_from_slice(&data);
                }
            }
        }
    }
}
