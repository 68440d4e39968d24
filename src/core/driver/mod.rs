// src/core/driver/mod.rs

//! The boundary with the cluster client library.
//!
//! A `Driver` turns a `ClusterSpec` into a cluster-level client object, which in turn
//! opens sessions. The crate treats both as opaque capabilities: it only builds,
//! connects and closes them.

pub mod tcp;

use crate::core::codec::CodecRegistry;
use crate::core::errors::DriverError;
use crate::core::policy::{LoadBalancingPolicy, ReconnectionPolicy, RetryPolicy};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

pub use tcp::TcpDriver;

/// Low-level socket settings applied to every node connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub tcp_no_delay: bool,
    pub keep_alive: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(12000),
            tcp_no_delay: true,
            keep_alive: true,
        }
    }
}

/// Plain-text credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a driver needs to build a cluster client.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    contact_points: Vec<String>,
    port: u16,
    socket: SocketOptions,
    credentials: Option<Credentials>,
    load_balancing: Option<LoadBalancingPolicy>,
    retry: Option<RetryPolicy>,
    reconnection: Option<ReconnectionPolicy>,
    codecs: CodecRegistry,
}

impl ClusterSpec {
    pub fn builder() -> ClusterSpecBuilder {
        ClusterSpecBuilder::default()
    }

    pub fn contact_points(&self) -> &[String] {
        &self.contact_points
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_options(&self) -> &SocketOptions {
        &self.socket
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The explicit load balancing policy, or `None` for the driver default.
    pub fn load_balancing_policy(&self) -> Option<&LoadBalancingPolicy> {
        self.load_balancing.as_ref()
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn reconnection_policy(&self) -> Option<&ReconnectionPolicy> {
        self.reconnection.as_ref()
    }

    pub fn codec_registry(&self) -> &CodecRegistry {
        &self.codecs
    }
}

/// Builder for `ClusterSpec`.
#[derive(Debug, Clone)]
pub struct ClusterSpecBuilder {
    contact_points: Vec<String>,
    port: u16,
    socket: SocketOptions,
    credentials: Option<Credentials>,
    load_balancing: Option<LoadBalancingPolicy>,
    retry: Option<RetryPolicy>,
    reconnection: Option<ReconnectionPolicy>,
    codecs: CodecRegistry,
}

impl Default for ClusterSpecBuilder {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            port: 9042,
            socket: SocketOptions::default(),
            credentials: None,
            load_balancing: None,
            retry: None,
            reconnection: None,
            codecs: CodecRegistry::new(),
        }
    }
}

impl ClusterSpecBuilder {
    pub fn add_contact_points<S: Into<String>>(mut self, hosts: impl IntoIterator<Item = S>) -> Self {
        self.contact_points.extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_load_balancing_policy(mut self, policy: LoadBalancingPolicy) -> Self {
        self.load_balancing = Some(policy);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_reconnection_policy(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = Some(policy);
        self
    }

    pub fn with_codec_registry(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn build(self) -> ClusterSpec {
        ClusterSpec {
            contact_points: self.contact_points,
            port: self.port,
            socket: self.socket,
            credentials: self.credentials,
            load_balancing: self.load_balancing,
            retry: self.retry,
            reconnection: self.reconnection,
            codecs: self.codecs,
        }
    }
}

/// Builds cluster client objects.
pub trait Driver: Send + Sync {
    /// Finalizes a cluster client from its spec. No connection is opened yet.
    fn build(&self, spec: ClusterSpec) -> Result<Box<dyn DriverCluster>, DriverError>;
}

/// A cluster-level client object. Owns node connections and background resources.
#[async_trait]
pub trait DriverCluster: Send + Sync {
    fn spec(&self) -> &ClusterSpec;

    /// Opens a session, optionally bound to `keyspace`.
    async fn connect(&self, keyspace: Option<&str>) -> Result<Box<dyn DriverSession>, DriverError>;

    /// Releases every resource held by the cluster, including its sessions. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A session opened from a `DriverCluster`.
pub trait DriverSession: Send + Sync {
    fn keyspace(&self) -> Option<&str>;

    /// Number of node connections currently open.
    fn open_connections(&self) -> usize;

    fn close(&self);

    fn is_closed(&self) -> bool;
}
