// src/core/driver/tcp.rs

//! The default driver: plain TCP connections to every contact point.
//!
//! It establishes and owns the node sockets with the configured socket options but
//! does not speak the native protocol; higher layers own the wire format.

use super::{ClusterSpec, Driver, DriverCluster, DriverSession, SocketOptions};
use crate::core::errors::DriverError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tracing::{debug, info, warn};

type ConnectionPool = Arc<Mutex<Vec<TcpStream>>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDriver;

impl Driver for TcpDriver {
    fn build(&self, spec: ClusterSpec) -> Result<Box<dyn DriverCluster>, DriverError> {
        if spec.contact_points().is_empty() {
            return Err(DriverError::InvalidConfiguration(
                "at least one contact point is required".to_string(),
            ));
        }
        if spec.port() == 0 {
            return Err(DriverError::InvalidConfiguration(
                "port must be non-zero".to_string(),
            ));
        }
        Ok(Box::new(TcpCluster {
            spec,
            pools: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A cluster of nodes reached over TCP.
pub struct TcpCluster {
    spec: ClusterSpec,
    /// Connection pools of every session opened from this cluster.
    pools: Mutex<Vec<ConnectionPool>>,
    closed: AtomicBool,
}

#[async_trait]
impl DriverCluster for TcpCluster {
    fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    async fn connect(&self, keyspace: Option<&str>) -> Result<Box<dyn DriverSession>, DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }

        let port = self.spec.port();
        let mut streams = Vec::new();
        let mut failures = Vec::new();
        for host in self.spec.contact_points() {
            match open_socket(host, port, self.spec.socket_options()).await {
                Ok(stream) => {
                    debug!("Connected to contact point {}:{}", host, port);
                    streams.push(stream);
                }
                Err(e) => {
                    warn!("Failed to connect to contact point {}:{}: {}", host, port, e);
                    failures.push(format!("{host}:{port} ({e})"));
                }
            }
        }
        if streams.is_empty() {
            return Err(DriverError::NoHostAvailable(failures.join(", ")));
        }

        info!(
            "Session opened on {}/{} contact points",
            streams.len(),
            self.spec.contact_points().len()
        );
        let pool: ConnectionPool = Arc::new(Mutex::new(streams));
        self.pools.lock().push(pool.clone());

        // The cluster may have been closed while we were connecting.
        if self.is_closed() {
            pool.lock().clear();
            return Err(DriverError::Closed);
        }

        Ok(Box::new(TcpSession {
            keyspace: keyspace.map(str::to_string),
            pool,
            closed: AtomicBool::new(false),
        }))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for pool in self.pools.lock().drain(..) {
            pool.lock().clear();
        }
        debug!("Closed cluster for {:?}", self.spec.contact_points());
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct TcpSession {
    keyspace: Option<String>,
    pool: ConnectionPool,
    closed: AtomicBool,
}

impl DriverSession for TcpSession {
    fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    fn open_connections(&self) -> usize {
        self.pool.lock().len()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.lock().clear();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Resolves `host` and connects to the first address that accepts, within the
/// connect timeout.
async fn open_socket(host: &str, port: u16, options: &SocketOptions) -> io::Result<TcpStream> {
    let addrs = tokio::time::timeout(options.connect_timeout, lookup_host((host, port)))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "address resolution timed out"))??;

    let mut last_error = None;
    for addr in addrs {
        let socket = match configured_socket(addr, options) {
            Ok(socket) => socket,
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        };
        match tokio::time::timeout(options.connect_timeout, socket.connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => last_error = Some(e),
            Err(_) => {
                last_error = Some(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out"),
                ))
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("'{host}' did not resolve"))
    }))
}

fn configured_socket(addr: SocketAddr, options: &SocketOptions) -> io::Result<TcpSocket> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(options.keep_alive)?;
    socket.set_nodelay(options.tcp_no_delay)?;
    Ok(socket)
}
