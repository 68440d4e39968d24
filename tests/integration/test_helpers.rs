// tests/integration/test_helpers.rs

//! Test helpers: an in-memory driver that records what it was asked to do, and a
//! registry that records invalidations.

#![allow(dead_code)]

use async_trait::async_trait;
use clusterlink::config::DriverDefaults;
use clusterlink::core::driver::{ClusterSpec, Driver, DriverCluster, DriverSession};
use clusterlink::core::errors::DriverError;
use clusterlink::core::{
    ConnectionProperties, Session, SessionCache, SessionFactory, SessionKey, SessionRegistry,
    SharedSession,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, reload};

pub const TEST_URL: &str = "jdbc:cassandra://node1--node2:9042/app";

/// Sets up minimal tracing for tests (ignores the error if already initialized).
pub fn init_tracing() {
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Counts every call the mock driver receives.
#[derive(Debug, Default)]
pub struct DriverStats {
    pub builds: AtomicUsize,
    pub connects: AtomicUsize,
    pub cluster_closes: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub last_spec: Mutex<Option<ClusterSpec>>,
}

impl DriverStats {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
    pub fn cluster_closes(&self) -> usize {
        self.cluster_closes.load(Ordering::SeqCst)
    }
    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }
    pub fn last_spec(&self) -> ClusterSpec {
        self.last_spec
            .lock()
            .clone()
            .expect("the driver was never asked to build a cluster")
    }
}

/// A driver that never touches the network.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub stats: Arc<DriverStats>,
    pub fail_build: bool,
    pub fail_connect: bool,
    pub connect_delay: Option<Duration>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn failing_build() -> Self {
        Self {
            fail_build: true,
            ..Self::default()
        }
    }

    pub fn with_connect_delay(delay: Duration) -> Self {
        Self {
            connect_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn cache(&self) -> SessionCache {
        SessionCache::new(
            SessionFactory::new(Arc::new(self.clone())),
            DriverDefaults::default(),
        )
    }

    pub fn factory(&self) -> SessionFactory {
        SessionFactory::new(Arc::new(self.clone()))
    }
}

impl Driver for MockDriver {
    fn build(&self, spec: ClusterSpec) -> Result<Box<dyn DriverCluster>, DriverError> {
        self.stats.builds.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_spec.lock() = Some(spec.clone());
        if self.fail_build {
            return Err(DriverError::InvalidConfiguration("refused by mock".to_string()));
        }
        Ok(Box::new(MockCluster {
            spec,
            stats: self.stats.clone(),
            fail_connect: self.fail_connect,
            connect_delay: self.connect_delay,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MockCluster {
    spec: ClusterSpec,
    stats: Arc<DriverStats>,
    fail_connect: bool,
    connect_delay: Option<Duration>,
    closed: AtomicBool,
}

impl MockCluster {
    pub fn new(stats: Arc<DriverStats>) -> Self {
        Self {
            spec: ClusterSpec::builder().add_contact_points(["node1"]).build(),
            stats,
            fail_connect: false,
            connect_delay: None,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DriverCluster for MockCluster {
    fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    async fn connect(&self, keyspace: Option<&str>) -> Result<Box<dyn DriverSession>, DriverError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(DriverError::NoHostAvailable("all mock hosts are down".to_string()));
        }
        Ok(Box::new(MockSession {
            keyspace: keyspace.map(str::to_string),
            hosts: self.spec.contact_points().len(),
            stats: self.stats.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.cluster_closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockSession {
    keyspace: Option<String>,
    hosts: usize,
    stats: Arc<DriverStats>,
    closed: AtomicBool,
}

impl DriverSession for MockSession {
    fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    fn open_connections(&self) -> usize {
        if self.is_closed() { 0 } else { self.hosts }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.session_closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A registry that records every invalidation it receives.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    pub invalidated: Mutex<Vec<SessionKey>>,
}

impl RecordingRegistry {
    pub fn count(&self) -> usize {
        self.invalidated.lock().len()
    }
}

impl SessionRegistry for RecordingRegistry {
    fn invalidate(&self, key: &SessionKey) {
        self.invalidated.lock().push(key.clone());
    }
}

pub fn test_key() -> SessionKey {
    SessionKey::new(TEST_URL, Vec::<(String, String)>::new())
}

/// A `SharedSession` over a mock session, registered with `registry`.
pub fn shared_session(registry: &Arc<RecordingRegistry>) -> (SharedSession, Arc<DriverStats>) {
    let stats = Arc::new(DriverStats::default());
    let session = Session::new(
        Box::new(MockCluster::new(stats.clone())),
        Box::new(MockSession {
            keyspace: Some("app".to_string()),
            hosts: 1,
            stats: stats.clone(),
            closed: AtomicBool::new(false),
        }),
    );
    let key = test_key();
    let properties = ConnectionProperties::resolve(&key, &DriverDefaults::default())
        .expect("test URL resolves");
    let weak = Arc::downgrade(registry);
    let registry: Weak<dyn SessionRegistry> = weak;
    (SharedSession::new(key, properties, session, registry), stats)
}
