// src/core/session.rs

//! Defines `Session`, an open session together with the cluster client it came from.

use crate::core::codec::CodecRegistry;
use crate::core::driver::{ClusterSpec, DriverCluster, DriverSession};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// A live session and the cluster it was opened from.
///
/// Exactly one session is created per cluster, so closing the session closes the
/// cluster too. Not `Clone`: a session has one owner, which is the only party
/// allowed to close it.
pub struct Session {
    cluster: Box<dyn DriverCluster>,
    inner: Box<dyn DriverSession>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(cluster: Box<dyn DriverCluster>, inner: Box<dyn DriverSession>) -> Self {
        Self {
            cluster,
            inner,
            closed: AtomicBool::new(false),
        }
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.inner.keyspace()
    }

    pub fn spec(&self) -> &ClusterSpec {
        self.cluster.spec()
    }

    pub fn codec_registry(&self) -> &CodecRegistry {
        self.cluster.spec().codec_registry()
    }

    pub fn open_connections(&self) -> usize {
        self.inner.open_connections()
    }

    /// Closes the session and its cluster. Later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.close();
        self.cluster.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("contact_points", &self.spec().contact_points())
            .field("port", &self.spec().port())
            .field("keyspace", &self.keyspace())
            .field("closed", &self.is_closed())
            .finish()
    }
}
