// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The [`HttpTransport`] type.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, HOST, PROXY_AUTHORIZATION};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::Uri;
use http_body_util::Full;
use hyper::body::Incoming;
use tokio::runtime::Runtime;
use tracing::{debug, enabled, trace, Level};

use crate::config::{has_text, TransportSettings};
use crate::connection::{
    timed_out, ConnectionInfo, ConnectionLease, ConnectionManager, ConnectionTracker, Route,
};
use crate::error::{TransportError, TransportResult};
use crate::protocol::ProtocolRegistry;
use crate::proxy::{CredentialState, ProxyResolver, ResolvedProxies};
use crate::request::{prefix_path, prefix_uri, Request, Verb};
use crate::response::{read_fully, Response, ResponseBody};
use crate::retry::RetryPolicy;
use crate::stats::{Stats, StatsSnapshot};

const DEFAULT_HTTP_PORT: u16 = 80;

/// A blocking REST transport bound to one host.
///
/// Calls run one at a time on a private current-thread tokio runtime; the
/// `&mut self` receivers make that contract static. Use one transport per
/// logical connection when calls need to run in parallel.
///
/// # Example
///
/// ```rust,no_run
/// # fn example() -> Result<(), libdd_rest_transport::TransportError> {
/// use libdd_rest_transport::{HttpTransport, Request, TransportSettings};
/// use std::io::Read;
///
/// let mut transport = HttpTransport::new(TransportSettings::default(), "localhost:9200")?;
/// let mut response = transport.execute(Request::new(http::Method::GET, "_cluster/health"))?;
/// let mut text = String::new();
/// response.body.read_to_string(&mut text)?;
/// response.body.close();
/// # Ok(())
/// # }
/// ```
pub struct HttpTransport {
    runtime: Arc<Runtime>,
    host: Uri,
    timeout: Duration,
    buffer_limit: usize,
    registry: Arc<ProtocolRegistry>,
    tracker: ConnectionTracker,
    retry: RetryPolicy,
    stats: Arc<Stats>,
    proxies: ResolvedProxies,
    proxy_info: String,
    credentials: Option<CredentialState>,
    last_connection: Option<ConnectionInfo>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("proxies", &self.proxies)
            .field("last_connection", &self.last_connection)
            .finish_non_exhaustive()
    }
}

/// A request after verb mapping, addressing and body selection.
#[derive(Debug)]
struct Prepared {
    verb: Verb,
    uri: Uri,
    body: Option<Bytes>,
}

/// What one successful attempt produced.
struct Exchange {
    status: http::StatusCode,
    payload: Payload,
    info: ConnectionInfo,
}

enum Payload {
    Buffered(Bytes, ConnectionLease),
    Pending(Incoming, ConnectionLease),
}

impl HttpTransport {
    /// A transport for `host` (`host:port` or `http://host:port`), routed
    /// through [`ProtocolRegistry::global`].
    pub fn new(settings: TransportSettings, host: &str) -> TransportResult<Self> {
        Self::with_registry(settings, host, ProtocolRegistry::global())
    }

    /// A transport dialing through `registry`. A SOCKS proxy in `settings`
    /// is registered there for the `http` scheme.
    pub fn with_registry(
        settings: TransportSettings,
        host: &str,
        registry: Arc<ProtocolRegistry>,
    ) -> TransportResult<Self> {
        let host = parse_target(host)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                TransportError::IllegalState(format!("cannot start the IO runtime: {err}"))
            })?;

        let mut proxies = ProxyResolver::from_process_env(&settings).resolve(&registry);
        let credentials = proxies.credentials.take();
        let proxy_info = proxies.info();

        let stats = Arc::new(Stats::default());
        let mut transport = Self {
            runtime: Arc::new(runtime),
            host,
            timeout: settings.http_timeout,
            buffer_limit: settings.response_buffer_limit,
            registry,
            tracker: ConnectionTracker::new(ConnectionManager::new()),
            retry: RetryPolicy::new(settings.http_retries, Arc::clone(&stats)),
            stats,
            proxies,
            proxy_info,
            credentials: None,
            last_connection: None,
        };
        if let Some(credentials) = credentials {
            transport.install_credentials(credentials);
        }
        Ok(transport)
    }

    /// Send `credentials` preemptively on every following call: to the
    /// HTTP proxy when one is configured, and to the origin server.
    pub fn install_credentials(&mut self, credentials: CredentialState) {
        self.credentials = Some(credentials);
    }

    /// The host calls without an absolute uri are sent to.
    pub fn host(&self) -> &Uri {
        &self.host
    }

    /// Proxy description, e.g. `[SOCKS proxy s:1080][HTTP proxy p:3128]`.
    pub fn proxy_info(&self) -> &str {
        &self.proxy_info
    }

    /// Network counters accumulated over the transport's lifetime.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The connection that served the most recent successful call.
    pub fn last_connection(&self) -> Option<ConnectionInfo> {
        self.last_connection
    }

    /// Execute one call, retrying transient IO failures.
    ///
    /// Unknown methods and malformed targets fail before any network
    /// activity. After the retry ceiling the last IO error is returned
    /// unmodified as [`TransportError::Io`]. Time spent is added to
    /// [`HttpTransport::stats`] whether the call succeeds or not.
    pub fn execute(&mut self, request: Request) -> TransportResult<Response> {
        let prepared = self.prepare(&request)?;

        if enabled!(Level::TRACE) {
            trace!(
                "Tx {}[{}]@[{}][{}]?[{}] w/ payload [{}]",
                self.proxy_info,
                prepared.verb,
                prepared
                    .uri
                    .authority()
                    .map(Authority::as_str)
                    .unwrap_or_default(),
                prepared.uri.path(),
                prepared.uri.query().unwrap_or_default(),
                prepared
                    .body
                    .as_deref()
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default(),
            );
        }

        let start = Instant::now();
        let outcome = self.send_with_retry(&prepared);
        self.stats.record_network_time(start.elapsed());
        let exchange = outcome?;
        self.last_connection = Some(exchange.info);

        let body = match exchange.payload {
            Payload::Buffered(bytes, lease) => ResponseBody::buffered(bytes, Some(lease)),
            Payload::Pending(incoming, lease) if enabled!(Level::TRACE) => {
                let bytes = self
                    .runtime
                    .block_on(read_fully(incoming, self.timeout))
                    .map_err(|err| {
                        TransportError::IllegalState(format!(
                            "cannot read the response body of {request}: {err}"
                        ))
                    })?;
                ResponseBody::buffered(bytes, Some(lease))
            }
            Payload::Pending(incoming, lease) => {
                ResponseBody::streaming(incoming, Arc::clone(&self.runtime), self.timeout, lease)
            }
        };

        if enabled!(Level::TRACE) {
            let text = body
                .copy()
                .map(|cursor| String::from_utf8_lossy(cursor.get_ref()).into_owned())
                .unwrap_or_default();
            trace!(
                "Rx {}@[{}] [{}-{}] [{}]",
                self.proxy_info,
                exchange.info.local_addr,
                exchange.status.as_u16(),
                exchange.status.canonical_reason().unwrap_or_default(),
                text,
            );
        }

        Ok(Response {
            status_code: exchange.status.as_u16(),
            body,
            source_uri: request.source(),
        })
    }

    /// Drop the idle connection. Safe to call any number of times.
    pub fn close(&mut self) {
        self.tracker.manager().close_idle();
    }

    fn prepare(&self, request: &Request) -> TransportResult<Prepared> {
        let verb = Verb::try_from(&request.method)?;

        let base = match has_text(request.uri.as_deref()) {
            Some(uri) => parse_target(uri)?,
            None => self.host.clone(),
        };

        // The path goes on after the target and replaces the target's own.
        let path = prefix_path(request.path.trim());
        let query = has_text(request.params.as_deref()).or(base.query());
        let path_and_query = match query {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };

        let mut parts = base.into_parts();
        parts.path_and_query = Some(
            PathAndQuery::try_from(path_and_query)
                .map_err(|err| TransportError::invalid_uri(request.to_string(), err))?,
        );
        let uri = Uri::from_parts(parts)
            .map_err(|err| TransportError::invalid_uri(request.to_string(), err))?;

        let body = request.body.clone().filter(|_| verb.is_body_capable());
        Ok(Prepared { verb, uri, body })
    }

    fn route(&self, uri: &Uri) -> Route {
        let dialer = self.registry.dialer("http");
        match &self.proxies.routing.http_proxy {
            Some(proxy) => Route::new(proxy.host.clone(), proxy.port, dialer),
            None => Route::new(
                unbracket(uri.host().unwrap_or_default()),
                uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT),
                dialer,
            ),
        }
    }

    fn http_request(&self, prepared: &Prepared) -> TransportResult<http::Request<Full<Bytes>>> {
        let uri = &prepared.uri;
        let authority = uri.authority().map(Authority::as_str).unwrap_or_default();
        let proxied = self.proxies.routing.http_proxy.is_some();
        let target = if proxied {
            uri.to_string()
        } else {
            uri.path_and_query()
                .map(PathAndQuery::as_str)
                .unwrap_or("/")
                .to_owned()
        };

        let mut builder = http::Request::builder()
            .method(prepared.verb.as_method())
            .uri(target)
            .header(HOST, authority);
        if let Some(body) = &prepared.body {
            builder = builder.header(CONTENT_LENGTH, body.len());
        }
        if let Some(credentials) = &self.credentials {
            if proxied {
                builder = builder.header(PROXY_AUTHORIZATION, credentials.proxy().basic_header());
            }
            builder = builder.header(AUTHORIZATION, credentials.origin().basic_header());
        }
        builder
            .body(Full::new(prepared.body.clone().unwrap_or_default()))
            .map_err(|err| TransportError::invalid_uri(uri.to_string(), err))
    }

    fn send_with_retry(&self, prepared: &Prepared) -> TransportResult<Exchange> {
        let mut execution_count = 0;
        loop {
            execution_count += 1;
            let request = self.http_request(prepared)?;
            match self.runtime.block_on(self.send_once(prepared, request)) {
                Ok(exchange) => return Ok(exchange),
                Err(err) if self.retry.should_retry(prepared.verb, &err, execution_count) => {}
                Err(err) => {
                    debug!(
                        http.method = %prepared.verb,
                        attempts = execution_count,
                        error = %err,
                        "Request failed"
                    );
                    return Err(err.into());
                }
            }
        }
    }

    async fn send_once(
        &self,
        prepared: &Prepared,
        request: http::Request<Full<Bytes>>,
    ) -> io::Result<Exchange> {
        let route = self.route(&prepared.uri);
        let (mut connection, info) = self.tracker.acquire(&route, self.timeout).await?;
        let response = tokio::time::timeout(self.timeout, connection.send(request))
            .await
            .map_err(|_| timed_out("response", self.timeout))??;

        let (parts, incoming) = response.into_parts();
        let lease = ConnectionLease::new(connection, Arc::clone(self.tracker.manager()));
        let content_length = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<usize>().ok());
        let in_memory = prepared.verb == Verb::Head
            || content_length == Some(0)
            || (self.buffer_limit > 0 && content_length.is_some_and(|len| len <= self.buffer_limit));

        let payload = if in_memory {
            Payload::Buffered(read_fully(incoming, self.timeout).await?, lease)
        } else {
            Payload::Pending(incoming, lease)
        };
        Ok(Exchange {
            status: parts.status,
            payload,
            info,
        })
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Normalise and validate an absolute target.
fn parse_target(target: &str) -> TransportResult<Uri> {
    let uri: Uri = prefix_uri(target.trim())
        .parse()
        .map_err(|err| TransportError::invalid_uri(target, err))?;
    if uri.scheme() != Some(&Scheme::HTTP) {
        return Err(TransportError::UnsupportedScheme(
            uri.scheme_str().unwrap_or_default().to_owned(),
        ));
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(TransportError::InvalidConfig(format!(
            "target {target} does not name a host"
        )));
    }
    Ok(uri)
}

fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|host| host.strip_suffix(']'))
        .unwrap_or(host)
}
