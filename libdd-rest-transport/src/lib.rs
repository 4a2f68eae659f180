// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! `libdd-rest-transport` executes REST calls against one search cluster
//! node. It offers a blocking `execute()` API over [`HttpTransport`] with
//! transparent retries of transient IO failures, HTTP and SOCKS5 proxy
//! routing, per-instance network statistics and response bodies that can
//! be read again when they are held in memory.
//!
//! # Proxies
//!
//! Proxies come from [`TransportSettings`], falling back to the process
//! environment when `use_system_props` is set. A SOCKS proxy is installed
//! as the `http` dialer of the transport's [`ProtocolRegistry`]; with the
//! default registry this affects every transport in the process.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # fn example() -> Result<(), libdd_rest_transport::TransportError> {
//! use libdd_rest_transport::{HttpTransport, Request, TransportSettings};
//!
//! let mut transport = HttpTransport::new(TransportSettings::default(), "localhost:9200")?;
//! let mut response = transport.execute(Request::new(http::Method::HEAD, "/"))?;
//! println!("Status: {}", response.status_code);
//! response.body.close();
//! println!("Retries so far: {}", transport.stats().retry_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod protocol;
pub mod proxy;

mod client;
mod connection;
mod error;
mod request;
mod response;
pub mod retry;
mod socks;
mod stats;

pub use client::HttpTransport;
pub use config::{SystemProxyDefaults, TransportSettings};
pub use connection::ConnectionInfo;
pub use error::{TransportError, TransportResult};
pub use protocol::{Dialer, ProtocolRegistry, SocksProxy};
pub use proxy::{CredentialState, Credentials, ProxyConfig, ProxyKind, ProxyResolver};
pub use request::{Request, Verb};
pub use response::{Response, ResponseBody};
pub use retry::RetryPolicy;
pub use stats::{Stats, StatsSnapshot};
