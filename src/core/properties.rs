// src/core/properties.rs

//! Resolves a `SessionKey` (connection URL plus caller overrides) into the
//! `ConnectionProperties` a session is built from.
//!
//! URLs look like `jdbc:cassandra://host1--host2:9042/keyspace?option=value`. Hosts
//! are separated by `--`, and every query option becomes a property of the same name.
//! Overrides supplied by the caller win over anything parsed from the URL.

use crate::config::DriverDefaults;
use crate::core::errors::{ClusterLinkError, ConnectionFailure, SettingParseError};
use crate::core::policy::Setting;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The reserved key entry holding the raw connection URL.
pub const URL_KEY: &str = "url";

pub const HOSTS: &str = "hosts";
pub const PORT: &str = "port";
pub const KEYSPACE: &str = "keyspace";
pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const LOAD_BALANCING: &str = "loadbalancing";
pub const RETRY: &str = "retry";
pub const RECONNECTION: &str = "reconnection";
pub const CONNECT_TIMEOUT: &str = "connecttimeout";
pub const READ_TIMEOUT: &str = "readtimeout";
pub const TCP_NO_DELAY: &str = "tcpnodelay";
pub const KEEP_ALIVE: &str = "keepalive";
pub const DEBUG: &str = "debug";

pub const URL_SCHEME: &str = "cassandra";
pub const HOST_SEPARATOR: &str = "--";

/// The identity of a shared session: the connection URL plus every override the
/// caller passed. Two keys are equal iff they would build the same session.
/// Override names are case-insensitive, like URL query names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(BTreeMap<String, String>);

impl SessionKey {
    pub fn new<K, V>(url: impl Into<String>, overrides: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: BTreeMap<String, String> = overrides
            .into_iter()
            .map(|(k, v)| (k.into().to_lowercase(), v.into()))
            .collect();
        entries.insert(URL_KEY.to_string(), url.into());
        Self(entries)
    }

    pub fn url(&self) -> &str {
        self.0.get(URL_KEY).map(String::as_str).unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_lowercase()).map(String::as_str)
    }

    /// The caller overrides, i.e. every entry except the URL.
    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != URL_KEY)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url())
    }
}

/// Parses a connection URL into a flat property map.
pub fn parse_url(raw: &str) -> Result<BTreeMap<String, String>, ClusterLinkError> {
    let invalid = |reason: String| ClusterLinkError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    // `"` is not valid in a URL but is common in policy arguments.
    let normalized = raw.trim().replace('"', "'");
    let without_prefix = normalized.strip_prefix("jdbc:").unwrap_or(&normalized);
    let url = Url::parse(without_prefix).map_err(|e| invalid(e.to_string()))?;

    if url.scheme() != URL_SCHEME {
        return Err(invalid(format!(
            "expected scheme '{URL_SCHEME}', found '{}'",
            url.scheme()
        )));
    }
    let hosts = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host".to_string()))?;

    let mut props = BTreeMap::new();
    props.insert(HOSTS.to_string(), hosts.to_string());
    if let Some(port) = url.port() {
        props.insert(PORT.to_string(), port.to_string());
    }
    let keyspace = url.path().trim_start_matches('/');
    if keyspace.contains('/') {
        return Err(invalid(format!("'{keyspace}' is not a keyspace name")));
    }
    if !keyspace.is_empty() {
        props.insert(KEYSPACE.to_string(), keyspace.to_string());
    }
    for (name, value) in url.query_pairs() {
        props.insert(name.to_lowercase(), value.into_owned());
    }
    Ok(props)
}

/// The fully resolved configuration of one session. Immutable once built.
#[derive(Clone, PartialEq)]
pub struct ConnectionProperties {
    pub hosts: Vec<String>,
    pub port: u16,
    pub keyspace: Option<String>,
    pub username: String,
    pub password: String,
    pub load_balancing_policy: String,
    pub retry_policy: String,
    pub reconnection_policy: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub tcp_no_delay: bool,
    pub keep_alive: bool,
    pub debug: bool,
    raw: BTreeMap<String, String>,
}

impl ConnectionProperties {
    /// Resolves a key: parses its URL, then applies the caller overrides on top.
    pub fn resolve(key: &SessionKey, defaults: &DriverDefaults) -> Result<Self, ClusterLinkError> {
        let mut raw = parse_url(key.url())?;
        for (name, value) in key.overrides() {
            raw.insert(name.to_string(), value.to_string());
        }
        let props = Self::from_map(raw, defaults)?;
        debug!("Final properties for connection: {:?}", props);
        Ok(props)
    }

    /// Builds typed properties from a flat map, applying `defaults` for missing entries.
    pub fn from_map(
        raw: BTreeMap<String, String>,
        defaults: &DriverDefaults,
    ) -> Result<Self, ClusterLinkError> {
        let text = |name: &str| raw.get(name).map(|v| v.trim()).unwrap_or_default().to_string();

        let hosts: Vec<String> = text(HOSTS)
            .split(HOST_SEPARATOR)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(ClusterLinkError::InvalidProperty {
                property: HOSTS.to_string(),
                value: text(HOSTS),
            });
        }

        let port = match raw.get(PORT) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ClusterLinkError::InvalidProperty {
                    property: PORT.to_string(),
                    value: value.clone(),
                })?,
            None => defaults.port,
        };

        let debug = text(DEBUG) == "true";
        let connect_timeout =
            resolve_timeout(CONNECT_TIMEOUT, raw.get(CONNECT_TIMEOUT), defaults.connect_timeout, debug)?;
        let read_timeout =
            resolve_timeout(READ_TIMEOUT, raw.get(READ_TIMEOUT), defaults.read_timeout, debug)?;

        let keyspace = Some(text(KEYSPACE)).filter(|k| !k.is_empty());
        let username = text(USER);
        let password = raw.get(PASSWORD).cloned().unwrap_or_default();
        let load_balancing_policy = text(LOAD_BALANCING);
        let retry_policy = text(RETRY);
        let reconnection_policy = text(RECONNECTION);
        let tcp_no_delay = parse_flag(raw.get(TCP_NO_DELAY), defaults.tcp_no_delay);
        let keep_alive = parse_flag(raw.get(KEEP_ALIVE), defaults.keep_alive);

        Ok(Self {
            hosts,
            port,
            keyspace,
            username,
            password,
            load_balancing_policy,
            retry_policy,
            reconnection_policy,
            connect_timeout,
            read_timeout,
            tcp_no_delay,
            keep_alive,
            debug,
            raw,
        })
    }

    /// Any resolved property, including ones this crate does not interpret.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }
}

impl fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProperties")
            .field("hosts", &self.hosts)
            .field("port", &self.port)
            .field("keyspace", &self.keyspace)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("load_balancing_policy", &self.load_balancing_policy)
            .field("retry_policy", &self.retry_policy)
            .field("reconnection_policy", &self.reconnection_policy)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("tcp_no_delay", &self.tcp_no_delay)
            .field("keep_alive", &self.keep_alive)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Mirrors the driver's boolean parsing: only a case-insensitive `true` is true.
fn parse_flag(value: Option<&String>, default: bool) -> bool {
    match value {
        Some(v) => v.trim().eq_ignore_ascii_case("true"),
        None => default,
    }
}

fn resolve_timeout(
    setting: &'static str,
    value: Option<&String>,
    default: Duration,
    debug: bool,
) -> Result<Duration, ClusterLinkError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed = value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| SettingParseError::new(setting, value.as_str(), e.to_string()));

    Setting::evaluate(parsed, debug, || Some(default))
        .into_result()
        .map(|timeout| timeout.unwrap_or(default))
        .map_err(|e| ConnectionFailure::Setting(e).into())
}
