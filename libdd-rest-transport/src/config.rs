// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration types for `libdd-rest-transport`.
//!
//! The transport consumes an already-resolved flat bag of values,
//! [`TransportSettings`]. It deserializes from the connector's property
//! names (`es.http.retries`, `es.net.proxy.http.host`, ...) so any serde
//! format holding those keys can feed it. Process-wide proxy defaults come
//! from [`SystemProxyDefaults`] and are consulted only when
//! [`TransportSettings::use_system_props`] is set.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

const DEFAULT_HTTP_RETRIES: u32 = 3;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolved settings for one transport instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Retries granted to a failing call, not counting the initial call.
    #[serde(rename = "es.http.retries")]
    pub http_retries: u32,

    /// Bounds connection acquisition and every socket read.
    #[serde(
        rename = "es.http.timeout",
        deserialize_with = "deserialize_time_value"
    )]
    pub http_timeout: Duration,

    /// Responses with a known length up to this many bytes are read into
    /// memory before `execute` returns. `0` disables buffering.
    #[serde(rename = "es.http.response.buffer.limit")]
    pub response_buffer_limit: usize,

    /// Fall back to [`SystemProxyDefaults`] for anything not set here.
    #[serde(rename = "es.net.proxy.use.system.props")]
    pub use_system_props: bool,

    /// HTTP proxy host.
    #[serde(rename = "es.net.proxy.http.host")]
    pub http_proxy_host: Option<String>,
    /// HTTP proxy port, `0` when unset.
    #[serde(rename = "es.net.proxy.http.port")]
    pub http_proxy_port: u16,
    /// HTTP proxy user.
    #[serde(rename = "es.net.proxy.http.user")]
    pub http_proxy_user: Option<String>,
    /// HTTP proxy password.
    #[serde(rename = "es.net.proxy.http.pass")]
    pub http_proxy_pass: Option<String>,

    /// SOCKS proxy host.
    #[serde(rename = "es.net.proxy.socks.host")]
    pub socks_proxy_host: Option<String>,
    /// SOCKS proxy port, `0` when unset.
    #[serde(rename = "es.net.proxy.socks.port")]
    pub socks_proxy_port: u16,
    /// SOCKS proxy user.
    #[serde(rename = "es.net.proxy.socks.user")]
    pub socks_proxy_user: Option<String>,
    /// SOCKS proxy password.
    #[serde(rename = "es.net.proxy.socks.pass")]
    pub socks_proxy_pass: Option<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            http_retries: DEFAULT_HTTP_RETRIES,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            response_buffer_limit: 0,
            use_system_props: false,
            http_proxy_host: None,
            http_proxy_port: 0,
            http_proxy_user: None,
            http_proxy_pass: None,
            socks_proxy_host: None,
            socks_proxy_port: 0,
            socks_proxy_user: None,
            socks_proxy_pass: None,
        }
    }
}

/// `Some` only for a value with non-whitespace content.
pub(crate) fn has_text(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn deserialize_time_value<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(text) => parse_time_value(&text).map_err(serde::de::Error::custom),
    }
}

/// Parse `"500ms"`, `"30s"`, `"1m"`, `"2h"` or a bare number of milliseconds.
pub fn parse_time_value(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid time value `{value}`"))?;
    let millis_per_unit = match unit.trim() {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        other => return Err(format!("unknown time unit `{other}` in `{value}`")),
    };
    amount
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("time value `{value}` overflows"))
}

/// Read access to process environment variables.
pub trait QueryEnv {
    /// The value of `var`, if set.
    fn get_var(&self, var: &str) -> Option<String>;
}

/// [`QueryEnv`] over the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealEnv;

impl QueryEnv for RealEnv {
    fn get_var(&self, var: &str) -> Option<String> {
        std::env::var(var).ok()
    }
}

/// Process-wide proxy defaults.
///
/// Read from `HTTP_PROXY`/`http_proxy` for the HTTP proxy and from
/// `ALL_PROXY`/`all_proxy`/`SOCKS_PROXY` (`socks5://[user:pass@]host:port`)
/// for the SOCKS proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemProxyDefaults {
    /// HTTP proxy host.
    pub http_host: Option<String>,
    /// HTTP proxy port.
    pub http_port: Option<u16>,
    /// SOCKS proxy host.
    pub socks_host: Option<String>,
    /// SOCKS proxy port.
    pub socks_port: Option<u16>,
    /// SOCKS proxy user.
    pub socks_user: Option<String>,
    /// SOCKS proxy password.
    pub socks_pass: Option<String>,
}

impl SystemProxyDefaults {
    /// Defaults from the real process environment.
    pub fn from_process_env() -> Self {
        Self::from_env(&RealEnv)
    }

    /// Defaults from the given environment.
    pub fn from_env<E: QueryEnv>(env: &E) -> Self {
        let mut defaults = Self::default();

        let http = ["HTTP_PROXY", "http_proxy"]
            .iter()
            .find_map(|var| env.get_var(var))
            .and_then(|value| ProxyUrl::parse(&value));
        if let Some(url) = http.filter(|url| url.scheme == "http") {
            defaults.http_host = Some(url.host);
            defaults.http_port = url.port;
        }

        let socks = ["ALL_PROXY", "all_proxy", "SOCKS_PROXY"]
            .iter()
            .filter_map(|var| env.get_var(var))
            .filter_map(|value| ProxyUrl::parse(&value))
            .find(|url| url.scheme.starts_with("socks"));
        if let Some(url) = socks {
            defaults.socks_host = Some(url.host);
            defaults.socks_port = url.port;
            defaults.socks_user = url.user;
            defaults.socks_pass = url.pass;
        }

        defaults
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ProxyUrl {
    scheme: String,
    host: String,
    port: Option<u16>,
    user: Option<String>,
    pass: Option<String>,
}

impl ProxyUrl {
    fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let uri: http::Uri = crate::request::prefix_uri(value).parse().ok()?;
        let authority = uri.authority()?;
        let (user, pass) = match authority.as_str().rsplit_once('@') {
            Some((userinfo, _)) => match userinfo.split_once(':') {
                Some((user, pass)) => (Some(user.to_owned()), Some(pass.to_owned())),
                None => (Some(userinfo.to_owned()), None),
            },
            None => (None, None),
        };
        Some(Self {
            scheme: uri.scheme_str()?.to_ascii_lowercase(),
            host: authority.host().to_owned(),
            port: authority.port_u16(),
            user,
            pass,
        })
    }
}
