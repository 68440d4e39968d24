// src/core/holder.rs

//! Defines `SharedSession`, a session shared by many callers and kept alive by
//! an atomic reference count.
//!
//! The count is a small state machine rather than a plain counter:
//!
//! - `n >= 1`: `n` callers hold the session.
//! - `DRAINED` (-1): the last holder released it. The session is closed and this
//!   handle can never be acquired again.
//!
//! A handle is born with one holder, its creator, so there is no zero state: the
//! last release moves the count from 1 to `DRAINED` in a single CAS, and no
//! `acquire` can succeed on a session that is being closed.

use crate::core::metrics;
use crate::core::properties::{ConnectionProperties, SessionKey};
use crate::core::session::Session;
use std::fmt;
use std::sync::Weak;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, warn};

/// The terminal value of the reference count.
pub const DRAINED: i32 = -1;

/// Keyed storage that must forget a handle once it drains.
pub trait SessionRegistry: Send + Sync {
    /// Removes the entry for `key`. Must tolerate the entry being already gone or
    /// already replaced by a newer handle.
    fn invalidate(&self, key: &SessionKey);
}

/// The outcome of `SharedSession::release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other holders remain; carries the new count.
    Retained(i32),
    /// This call released the last reference and disposed of the session.
    Drained,
    /// The handle had already drained; nothing was changed.
    AlreadyDrained,
}

pub struct SharedSession {
    key: SessionKey,
    properties: ConnectionProperties,
    session: Session,
    references: AtomicI32,
    registry: Weak<dyn SessionRegistry>,
}

impl SharedSession {
    /// Wraps a freshly built session. The caller becomes the first holder.
    pub fn new(
        key: SessionKey,
        properties: ConnectionProperties,
        session: Session,
        registry: Weak<dyn SessionRegistry>,
    ) -> Self {
        metrics::OPEN_SESSIONS.inc();
        metrics::SESSION_REFERENCES.inc();
        metrics::SESSIONS_CREATED_TOTAL.inc();
        Self {
            key,
            properties,
            session,
            references: AtomicI32::new(1),
            registry,
        }
    }

    /// Tries to become an additional holder.
    ///
    /// Returns `false` if the handle has drained. That is an expected race with
    /// the final `release`: the caller must look the key up again rather than
    /// retry on this handle.
    pub fn acquire(&self) -> bool {
        loop {
            let current = self.references.load(Ordering::SeqCst);
            if current < 0 {
                debug!("Failed to acquire reference to {}", self.key);
                metrics::STALE_ACQUIRES_TOTAL.inc();
                return false;
            }
            if self
                .references
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                metrics::SESSION_REFERENCES.inc();
                debug!("Acquired reference to {}, new count = {}", self.key, current + 1);
                return true;
            }
            std::hint::spin_loop();
        }
    }

    /// Gives up one reference. The call that releases the last one closes the
    /// session and removes the handle from its registry.
    ///
    /// Releasing a drained handle is caller misuse; it is logged and ignored so the
    /// count never moves past `DRAINED`.
    pub fn release(&self) -> Release {
        let next = loop {
            let current = self.references.load(Ordering::SeqCst);
            if current < 0 {
                warn!("Release called on already drained session for {}", self.key);
                return Release::AlreadyDrained;
            }
            let next = if current == 1 { DRAINED } else { current - 1 };
            if self
                .references
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break next;
            }
            std::hint::spin_loop();
        };
        metrics::SESSION_REFERENCES.dec();

        if next == DRAINED {
            debug!("Released last reference to {}, closing session", self.key);
            self.dispose();
            Release::Drained
        } else {
            debug!("Released reference to {}, new count = {}", self.key, next);
            Release::Retained(next)
        }
    }

    fn dispose(&self) {
        // Only one session was opened from the cluster, so closing it closes both.
        self.session.close();
        metrics::OPEN_SESSIONS.dec();
        metrics::SESSIONS_DISPOSED_TOTAL.inc();
        if let Some(registry) = self.registry.upgrade() {
            registry.invalidate(&self.key);
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn properties(&self) -> &ConnectionProperties {
        &self.properties
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The current count, or `DRAINED`.
    pub fn references(&self) -> i32 {
        self.references.load(Ordering::SeqCst)
    }

    pub fn is_drained(&self) -> bool {
        self.references() < 0
    }
}

impl fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSession")
            .field("key", &self.key)
            .field("references", &self.references())
            .field("session", &self.session)
            .finish()
    }
}
