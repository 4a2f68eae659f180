// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-scheme socket dialers.
//!
//! A [`ProtocolRegistry`] maps a URI scheme to the [`Dialer`] that opens
//! sockets for it. Transports look the dialer up on every connection
//! acquisition, including calls that target an absolute uri, so a dialer
//! registered for `http` is honoured by every call made through that
//! registry.
//!
//! # Process-wide registration
//!
//! [`ProtocolRegistry::global`] is shared by every transport built without
//! an explicit registry. Registering a SOCKS dialer there (which the proxy
//! resolver does when a SOCKS proxy is configured) routes *all* such
//! transports in the process through that proxy from then on, not only the
//! one whose settings named it. This mirrors the semantics the connector
//! relies on. Inject a private registry with
//! [`crate::HttpTransport::with_registry`] to keep the effect local.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::socks::{socks5_connect, SocksAuth};

static GLOBAL_REGISTRY: LazyLock<Arc<ProtocolRegistry>> =
    LazyLock::new(|| Arc::new(ProtocolRegistry::default()));

/// Opens the TCP socket a connection runs on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dialer {
    /// Connect straight to the target.
    #[default]
    Direct,
    /// Tunnel through a SOCKS5 proxy.
    Socks(SocksProxy),
}

/// A SOCKS5 proxy endpoint with optional credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksProxy {
    host: String,
    port: u16,
    auth: Option<SocksAuth>,
}

impl SocksProxy {
    /// A proxy at `host:port`. Credentials are offered only when a user is
    /// given; a missing password is sent as empty.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: Option<String>,
        pass: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            auth: user.map(|user| SocksAuth {
                user,
                pass: pass.unwrap_or_default(),
            }),
        }
    }

    /// Proxy host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Proxy port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether credentials are offered to the proxy.
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }
}

impl Dialer {
    /// Open a socket to `host:port` with Nagle's algorithm disabled.
    pub(crate) async fn dial(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        match self {
            Dialer::Direct => connect_tcp(host, port).await,
            Dialer::Socks(proxy) => {
                debug!(
                    socks.host = %proxy.host,
                    socks.port = proxy.port,
                    target.host = %host,
                    target.port = port,
                    "Dialing through SOCKS proxy"
                );
                let mut stream = connect_tcp(&proxy.host, proxy.port).await?;
                socks5_connect(&mut stream, proxy.auth.as_ref(), host, port).await?;
                Ok(stream)
            }
        }
    }
}

async fn connect_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    let unknown_host =
        |detail: String| io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}{detail}"));
    let addrs = lookup_host((host, port))
        .await
        .map_err(|err| unknown_host(format!(": {err}")))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| unknown_host(String::new())))
}

/// Scheme to [`Dialer`] table. Schemes without an entry dial directly.
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    protocols: RwLock<HashMap<String, Arc<Dialer>>>,
}

impl ProtocolRegistry {
    /// A fresh, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry. See the module docs for the consequences
    /// of registering into it.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Route every socket for `scheme` through `dialer`, replacing any
    /// previous registration.
    pub fn register(&self, scheme: &str, dialer: Dialer) {
        self.protocols
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scheme.to_ascii_lowercase(), Arc::new(dialer));
    }

    /// Drop the registration for `scheme`, returning it to direct dialing.
    pub fn unregister(&self, scheme: &str) {
        self.protocols
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&scheme.to_ascii_lowercase());
    }

    /// The dialer in effect for `scheme`.
    pub fn dialer(&self, scheme: &str) -> Arc<Dialer> {
        self.protocols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}
