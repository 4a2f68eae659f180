// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Effective proxy configuration.
//!
//! Precedence, highest first: values set in [`TransportSettings`], then
//! [`SystemProxyDefaults`] (only when `use_system_props` is set), then no
//! proxy. HTTP and SOCKS are resolved independently and may both be active:
//! SOCKS tunnels the sockets underneath the HTTP proxy.

use std::fmt;

use base64::Engine;
use http::HeaderValue;
use tracing::{debug, warn};

use crate::config::{has_text, SystemProxyDefaults, TransportSettings};
use crate::protocol::{Dialer, ProtocolRegistry, SocksProxy};

const DEFAULT_HTTP_PROXY_PORT: u16 = 80;
const DEFAULT_SOCKS_PROXY_PORT: u16 = 1080;

/// Which layer a proxy sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// Request-level HTTP proxy.
    Http,
    /// Socket-level SOCKS5 proxy.
    Socks,
}

/// One resolved proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// HTTP or SOCKS.
    pub kind: ProxyKind,
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// User, if any.
    pub user: Option<String>,
    /// Password, if any.
    pub pass: Option<String>,
    /// Send credentials with the first request instead of waiting for a
    /// challenge. Set for an HTTP proxy with a user.
    pub preemptive_auth: bool,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("preemptive_auth", &self.preemptive_auth)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ProxyKind::Http => "HTTP",
            ProxyKind::Socks => "SOCKS",
        };
        write!(f, "[{kind} proxy {}:{}]", self.host, self.port)
    }
}

/// A user/password pair sent as HTTP basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    pass: String,
}

impl Credentials {
    /// Credentials for `user`; a missing password is sent as empty.
    pub fn new(user: impl Into<String>, pass: Option<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.unwrap_or_default(),
        }
    }

    /// The user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn basic_header(&self) -> HeaderValue {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.user, self.pass));
        let mut value = HeaderValue::from_str(&format!("Basic {token}"))
            .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
        value.set_sensitive(true);
        value
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Credentials to install on the transport once it is fully built.
///
/// Scoped to any realm and used for both the proxy and the origin server:
/// in this deployment model the cluster behind the proxy shares the proxy's
/// credential domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialState {
    proxy: Credentials,
    origin: Credentials,
}

impl CredentialState {
    /// The same credentials for proxy and origin.
    pub fn shared(credentials: Credentials) -> Self {
        Self {
            proxy: credentials.clone(),
            origin: credentials,
        }
    }

    /// Credentials presented to the proxy.
    pub fn proxy(&self) -> &Credentials {
        &self.proxy
    }

    /// Credentials presented to the origin server.
    pub fn origin(&self) -> &Credentials {
        &self.origin
    }
}

/// Where connections are routed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routing {
    /// HTTP proxy requests are sent to, if any.
    pub http_proxy: Option<ProxyConfig>,
    /// SOCKS proxy sockets are tunnelled through, if any.
    pub socks_proxy: Option<ProxyConfig>,
}

/// Output of [`ProxyResolver::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedProxies {
    /// Routing to apply to the transport.
    pub routing: Routing,
    /// Credentials to install after the transport is built, if the HTTP
    /// proxy has a user.
    pub credentials: Option<CredentialState>,
}

impl ResolvedProxies {
    /// Proxy description used as a prefix in trace logs, SOCKS first.
    pub fn info(&self) -> String {
        [&self.routing.socks_proxy, &self.routing.http_proxy]
            .into_iter()
            .flatten()
            .map(ToString::to_string)
            .collect()
    }
}

/// Applies proxy precedence to a transport's settings.
#[derive(Debug)]
pub struct ProxyResolver<'a> {
    settings: &'a TransportSettings,
    system: SystemProxyDefaults,
}

impl<'a> ProxyResolver<'a> {
    /// A resolver falling back to `system` when the settings opt in.
    pub fn new(settings: &'a TransportSettings, system: SystemProxyDefaults) -> Self {
        let system = if settings.use_system_props {
            system
        } else {
            SystemProxyDefaults::default()
        };
        Self { settings, system }
    }

    /// A resolver falling back to the process environment.
    pub fn from_process_env(settings: &'a TransportSettings) -> Self {
        Self::new(settings, SystemProxyDefaults::from_process_env())
    }

    /// The effective HTTP proxy, without side effects.
    pub fn http_proxy(&self) -> Option<ProxyConfig> {
        let settings = self.settings;
        let host = has_text(settings.http_proxy_host.as_deref())
            .or(has_text(self.system.http_host.as_deref()))?;
        let port = Some(settings.http_proxy_port)
            .filter(|port| *port > 0)
            .or(self.system.http_port)
            .unwrap_or(DEFAULT_HTTP_PROXY_PORT);
        let user = has_text(settings.http_proxy_user.as_deref()).map(str::to_owned);
        let pass = has_text(settings.http_proxy_pass.as_deref()).map(str::to_owned);
        Some(ProxyConfig {
            kind: ProxyKind::Http,
            host: host.to_owned(),
            port,
            preemptive_auth: user.is_some(),
            user,
            pass,
        })
    }

    /// The effective SOCKS proxy, without side effects.
    pub fn socks_proxy(&self) -> Option<ProxyConfig> {
        let settings = self.settings;
        let host = has_text(settings.socks_proxy_host.as_deref())
            .or(has_text(self.system.socks_host.as_deref()))?;
        let port = Some(settings.socks_proxy_port)
            .filter(|port| *port > 0)
            .or(self.system.socks_port)
            .unwrap_or(DEFAULT_SOCKS_PROXY_PORT);
        let user = has_text(settings.socks_proxy_user.as_deref())
            .or(has_text(self.system.socks_user.as_deref()))
            .map(str::to_owned);
        let pass = has_text(settings.socks_proxy_pass.as_deref())
            .or(has_text(self.system.socks_pass.as_deref()))
            .map(str::to_owned);
        Some(ProxyConfig {
            kind: ProxyKind::Socks,
            host: host.to_owned(),
            port,
            user,
            pass,
            preemptive_auth: false,
        })
    }

    /// Resolve both proxies.
    ///
    /// A resolved SOCKS proxy is registered as the `http` dialer in
    /// `registry`, which affects every transport sharing that registry.
    /// The returned credentials must be installed on the transport after
    /// it has been constructed.
    pub fn resolve(&self, registry: &ProtocolRegistry) -> ResolvedProxies {
        let mut resolved = ResolvedProxies::default();

        if let Some(socks) = self.socks_proxy() {
            if socks.user.is_some() && socks.pass.is_none() {
                warn!(
                    "SOCKS proxy user specified but no/empty password defined - double check the [es.net.proxy.socks.pass] property"
                );
            }
            if socks.user.is_some() {
                debug!(proxy.host = %socks.host, proxy.port = socks.port, "Using authenticated SOCKS proxy");
            } else {
                debug!(proxy.host = %socks.host, proxy.port = socks.port, "Using SOCKS proxy");
            }
            registry.register(
                "http",
                Dialer::Socks(SocksProxy::new(
                    socks.host.clone(),
                    socks.port,
                    socks.user.clone(),
                    socks.pass.clone(),
                )),
            );
            resolved.routing.socks_proxy = Some(socks);
        }

        if let Some(http_proxy) = self.http_proxy() {
            if let Some(user) = &http_proxy.user {
                if http_proxy.pass.is_none() {
                    warn!(
                        "HTTP proxy user specified but no/empty password defined - double check the [es.net.proxy.http.pass] property"
                    );
                }
                resolved.credentials = Some(CredentialState::shared(Credentials::new(
                    user.clone(),
                    http_proxy.pass.clone(),
                )));
                debug!(proxy.host = %http_proxy.host, proxy.port = http_proxy.port, "Using authenticated HTTP proxy");
            } else {
                debug!(proxy.host = %http_proxy.host, proxy.port = http_proxy.port, "Using HTTP proxy");
            }
            resolved.routing.http_proxy = Some(http_proxy);
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> SystemProxyDefaults {
        SystemProxyDefaults {
            http_host: Some("sys-http".to_owned()),
            http_port: Some(8080),
            socks_host: Some("sys-socks".to_owned()),
            socks_port: Some(1085),
            socks_user: Some("sys-user".to_owned()),
            socks_pass: Some("sys-pass".to_owned()),
        }
    }

    fn opted_in() -> TransportSettings {
        TransportSettings {
            use_system_props: true,
            ..Default::default()
        }
    }

    #[test]
    fn no_proxy_by_default() {
        let settings = TransportSettings::default();
        let resolver = ProxyResolver::new(&settings, system());
        assert!(resolver.http_proxy().is_none());
        assert!(resolver.socks_proxy().is_none());

        let registry = ProtocolRegistry::new();
        let resolved = resolver.resolve(&registry);
        assert_eq!(resolved.routing, Routing::default());
        assert!(resolved.credentials.is_none());
        assert_eq!(resolved.info(), "");
        assert_eq!(*registry.dialer("http"), Dialer::Direct);
    }

    #[test]
    fn system_defaults_apply_when_opted_in() {
        let settings = opted_in();
        let resolver = ProxyResolver::new(&settings, system());

        let http = resolver.http_proxy().unwrap();
        assert_eq!((http.host.as_str(), http.port), ("sys-http", 8080));
        assert!(http.user.is_none());
        assert!(!http.preemptive_auth);

        let socks = resolver.socks_proxy().unwrap();
        assert_eq!((socks.host.as_str(), socks.port), ("sys-socks", 1085));
        assert_eq!(socks.user.as_deref(), Some("sys-user"));
        assert_eq!(socks.pass.as_deref(), Some("sys-pass"));
    }

    #[test]
    fn explicit_http_settings_win() {
        let settings = TransportSettings {
            http_proxy_host: Some("explicit-http".to_owned()),
            http_proxy_port: 3128,
            ..opted_in()
        };
        let http = ProxyResolver::new(&settings, system()).http_proxy().unwrap();
        assert_eq!((http.host.as_str(), http.port), ("explicit-http", 3128));
    }

    #[test]
    fn explicit_socks_settings_win() {
        let settings = TransportSettings {
            socks_proxy_host: Some("explicit-socks".to_owned()),
            socks_proxy_port: 1090,
            socks_proxy_user: Some("me".to_owned()),
            socks_proxy_pass: Some("mine".to_owned()),
            ..opted_in()
        };
        let socks = ProxyResolver::new(&settings, system()).socks_proxy().unwrap();
        assert_eq!((socks.host.as_str(), socks.port), ("explicit-socks", 1090));
        assert_eq!(socks.user.as_deref(), Some("me"));
        assert_eq!(socks.pass.as_deref(), Some("mine"));
    }

    #[test]
    fn explicit_host_with_system_port() {
        let settings = TransportSettings {
            http_proxy_host: Some("explicit-http".to_owned()),
            ..opted_in()
        };
        let http = ProxyResolver::new(&settings, system()).http_proxy().unwrap();
        assert_eq!((http.host.as_str(), http.port), ("explicit-http", 8080));
    }

    #[test]
    fn system_defaults_ignored_without_opt_in() {
        let settings = TransportSettings {
            socks_proxy_host: Some("explicit-socks".to_owned()),
            ..Default::default()
        };
        let resolver = ProxyResolver::new(&settings, system());
        assert!(resolver.http_proxy().is_none());
        let socks = resolver.socks_proxy().unwrap();
        assert_eq!(socks.port, 1080);
        assert!(socks.user.is_none());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let settings = TransportSettings {
            http_proxy_host: Some("  ".to_owned()),
            socks_proxy_host: Some(String::new()),
            ..Default::default()
        };
        let resolver = ProxyResolver::new(&settings, SystemProxyDefaults::default());
        assert!(resolver.http_proxy().is_none());
        assert!(resolver.socks_proxy().is_none());
    }

    #[test]
    fn http_user_builds_shared_preemptive_credentials() {
        let settings = TransportSettings {
            http_proxy_host: Some("proxy".to_owned()),
            http_proxy_user: Some("alice".to_owned()),
            http_proxy_pass: Some("secret".to_owned()),
            ..Default::default()
        };
        let resolved = ProxyResolver::new(&settings, SystemProxyDefaults::default())
            .resolve(&ProtocolRegistry::new());

        let http = resolved.routing.http_proxy.as_ref().unwrap();
        assert_eq!(http.port, 80);
        assert!(http.preemptive_auth);

        let credentials = resolved.credentials.unwrap();
        assert_eq!(credentials.proxy(), credentials.origin());
        assert_eq!(credentials.proxy().user(), "alice");
        assert_eq!(
            credentials.proxy().basic_header(),
            HeaderValue::from_static("Basic YWxpY2U6c2VjcmV0")
        );
    }

    #[test]
    fn http_user_without_password_still_proceeds() {
        let settings = TransportSettings {
            http_proxy_host: Some("proxy".to_owned()),
            http_proxy_user: Some("alice".to_owned()),
            ..Default::default()
        };
        let resolved = ProxyResolver::new(&settings, SystemProxyDefaults::default())
            .resolve(&ProtocolRegistry::new());
        let credentials = resolved.credentials.unwrap();
        assert_eq!(
            credentials.origin().basic_header(),
            HeaderValue::from_static("Basic YWxpY2U6")
        );
    }

    #[test]
    fn socks_is_registered_for_http_scheme() {
        let settings = TransportSettings {
            socks_proxy_host: Some("socks".to_owned()),
            socks_proxy_user: Some("bob".to_owned()),
            http_proxy_host: Some("proxy".to_owned()),
            http_proxy_port: 3128,
            ..Default::default()
        };
        let registry = ProtocolRegistry::new();
        let resolved =
            ProxyResolver::new(&settings, SystemProxyDefaults::default()).resolve(&registry);

        assert_eq!(
            *registry.dialer("http"),
            Dialer::Socks(SocksProxy::new("socks", 1080, Some("bob".into()), None))
        );
        assert!(resolved.credentials.is_none());
        assert_eq!(
            resolved.info(),
            "[SOCKS proxy socks:1080][HTTP proxy proxy:3128]"
        );
    }

    #[test]
    fn debug_hides_passwords() {
        let settings = TransportSettings {
            http_proxy_host: Some("proxy".to_owned()),
            http_proxy_user: Some("alice".to_owned()),
            http_proxy_pass: Some("hunter2".to_owned()),
            ..Default::default()
        };
        let resolved = ProxyResolver::new(&settings, SystemProxyDefaults::default())
            .resolve(&ProtocolRegistry::new());
        let debug = format!("{resolved:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}
