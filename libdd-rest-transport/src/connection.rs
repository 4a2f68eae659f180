// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection acquisition for a single-host transport.
//!
//! The [`ConnectionManager`] keeps at most one idle HTTP/1.1 connection. A
//! connection is handed out for one call and comes back only when the
//! response body was read to the end; anything else discards it.

use std::error::Error as _;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tracing::{debug, trace};

use crate::protocol::Dialer;

/// Diagnostics for the connection that served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Local socket address.
    pub local_addr: SocketAddr,
    /// Address of the remote end: the origin, the HTTP proxy, or the SOCKS
    /// proxy the socket was tunnelled through.
    pub peer_addr: SocketAddr,
    /// Whether the connection had served an earlier call.
    pub reused: bool,
}

/// Where a connection goes and how its socket is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Route {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) dialer: Arc<Dialer>,
}

impl Route {
    pub(crate) fn new(host: impl Into<String>, port: u16, dialer: Arc<Dialer>) -> Self {
        Self {
            host: host.into(),
            port,
            dialer,
        }
    }
}

/// An HTTP/1.1 connection bound to one [`Route`].
pub(crate) struct Connection {
    sender: http1::SendRequest<Full<Bytes>>,
    route: Route,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    served: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("route", &self.route)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("served", &self.served)
            .finish()
    }
}

impl Connection {
    async fn open(route: &Route) -> io::Result<Self> {
        let stream = route.dialer.dial(&route.host, route.port).await?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;

        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(to_io_error)?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                trace!(error = %err, "Connection task ended with an error");
            }
        });

        debug!(
            route.host = %route.host,
            route.port = route.port,
            local_addr = %local_addr,
            peer_addr = %peer_addr,
            "Opened connection"
        );
        Ok(Self {
            sender,
            route: route.clone(),
            local_addr,
            peer_addr,
            served: 0,
        })
    }

    /// Local socket address, captured when the socket was opened.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            local_addr: self.local_addr,
            peer_addr: self.peer_addr,
            reused: self.served > 0,
        }
    }

    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    pub(crate) async fn send(
        &mut self,
        request: http::Request<Full<Bytes>>,
    ) -> io::Result<http::Response<Incoming>> {
        self.served += 1;
        self.sender.ready().await.map_err(to_io_error)?;
        self.sender.send_request(request).await.map_err(to_io_error)
    }
}

/// Map a hyper failure onto the IO taxonomy the retry policy decides on.
pub(crate) fn to_io_error(err: hyper::Error) -> io::Error {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return io::Error::new(io_err.kind(), err);
        }
        source = cause.source();
    }

    let kind = if err.is_timeout() {
        io::ErrorKind::TimedOut
    } else if err.is_parse() || err.is_parse_status() || err.is_parse_too_large() {
        io::ErrorKind::InvalidData
    } else if err.is_user() {
        io::ErrorKind::InvalidInput
    } else if err.is_incomplete_message() {
        io::ErrorKind::UnexpectedEof
    } else if err.is_canceled() || err.is_closed() {
        io::ErrorKind::ConnectionAborted
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, err)
}

pub(crate) fn timed_out(what: &str, after: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} timed out after {}ms", after.as_millis()),
    )
}

/// Single-connection manager.
#[derive(Debug, Default)]
pub(crate) struct ConnectionManager {
    idle: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn acquire(&self, route: &Route, timeout: Duration) -> io::Result<Connection> {
        let idle = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match idle {
            Some(connection) if connection.route == *route && connection.is_open() => {
                return Ok(connection)
            }
            Some(stale) => trace!(connection = ?stale, "Discarding idle connection"),
            None => {}
        }

        tokio::time::timeout(timeout, Connection::open(route))
            .await
            .map_err(|_| timed_out("connect", timeout))?
    }

    /// Take back a connection whose response was fully consumed.
    pub(crate) fn release(&self, connection: Connection) {
        if connection.is_open() {
            *self.idle.lock().unwrap_or_else(PoisonError::into_inner) = Some(connection);
        }
    }

    /// Drop the idle connection, if any. Safe to call repeatedly.
    pub(crate) fn close_idle(&self) {
        let idle = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = idle {
            debug!(local_addr = %connection.local_addr(), "Closing idle connection");
        }
    }

    #[cfg(test)]
    fn has_idle(&self) -> bool {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// A connection checked out for the lifetime of one response body.
#[derive(Debug)]
pub(crate) struct ConnectionLease {
    connection: Connection,
    manager: Arc<ConnectionManager>,
}

impl ConnectionLease {
    pub(crate) fn new(connection: Connection, manager: Arc<ConnectionManager>) -> Self {
        Self {
            connection,
            manager,
        }
    }

    /// Hand the connection back when the body was consumed to the end,
    /// otherwise drop it along with its unread bytes.
    pub(crate) fn finish(self, consumed: bool) {
        if consumed {
            self.manager.release(self.connection);
        } else {
            trace!(local_addr = %self.connection.local_addr(), "Discarding partially read connection");
        }
    }
}

/// Observes every acquisition on a [`ConnectionManager`] and hands the
/// caller the connection together with its [`ConnectionInfo`].
#[derive(Debug, Clone)]
pub(crate) struct ConnectionTracker {
    manager: Arc<ConnectionManager>,
}

impl ConnectionTracker {
    pub(crate) fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub(crate) fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub(crate) async fn acquire(
        &self,
        route: &Route,
        timeout: Duration,
    ) -> io::Result<(Connection, ConnectionInfo)> {
        let connection = self.manager.acquire(route, timeout).await?;
        let info = connection.info();
        trace!(
            local_addr = %info.local_addr,
            peer_addr = %info.peer_addr,
            reused = info.reused,
            "Acquired connection"
        );
        Ok((connection, info))
    }
}
