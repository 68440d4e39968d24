// src/core/lease.rs

//! Defines `SessionLease`, an RAII guard over one reference to a shared session.

use crate::core::holder::{Release, SharedSession};
use crate::core::properties::ConnectionProperties;
use crate::core::session::Session;
use std::sync::Arc;

/// Holds one reference on a `SharedSession` and releases it when dropped.
#[derive(Debug)]
pub struct SessionLease {
    handle: Arc<SharedSession>,
    released: bool,
}

impl SessionLease {
    /// Takes ownership of a reference the caller already holds on `handle`, either
    /// the initial one of a freshly created handle or one obtained from `acquire`.
    pub fn adopt(handle: Arc<SharedSession>) -> Self {
        Self {
            handle,
            released: false,
        }
    }

    pub fn session(&self) -> &Session {
        self.handle.session()
    }

    pub fn properties(&self) -> &ConnectionProperties {
        self.handle.properties()
    }

    pub fn handle(&self) -> &Arc<SharedSession> {
        &self.handle
    }

    /// Releases the reference now and reports the outcome.
    pub fn release(mut self) -> Release {
        self.released = true;
        self.handle.release()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.released {
            self.handle.release();
        }
    }
}
