// src/core/cache.rs

//! `SessionCache`, the keyed get-or-create store of shared sessions.

use crate::config::{Config, DriverDefaults};
use crate::core::driver::Driver;
use crate::core::errors::ClusterLinkError;
use crate::core::factory::SessionFactory;
use crate::core::holder::{SessionRegistry, SharedSession};
use crate::core::lease::SessionLease;
use crate::core::properties::{ConnectionProperties, SessionKey};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::debug;

/// Whether `get_or_create` built the handle or found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The handle was just built; the caller owns its initial reference.
    Created,
    /// The handle already existed; the caller holds no reference yet.
    Existing,
}

struct CacheInner {
    entries: DashMap<SessionKey, Arc<SharedSession>>,
    /// Per-key locks so that only one caller builds a session for a given key.
    build_locks: DashMap<SessionKey, Arc<Mutex<()>>>,
    factory: SessionFactory,
    defaults: DriverDefaults,
}

impl SessionRegistry for CacheInner {
    fn invalidate(&self, key: &SessionKey) {
        // A live handle may already have replaced the drained one; keep it.
        if self
            .entries
            .remove_if(key, |_, handle| handle.is_drained())
            .is_some()
        {
            debug!("Invalidated cached session for {}", key);
        }
    }
}

/// Shares one session per distinct `SessionKey`.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<CacheInner>,
}

impl SessionCache {
    pub fn new(factory: SessionFactory, defaults: DriverDefaults) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                build_locks: DashMap::new(),
                factory,
                defaults,
            }),
        }
    }

    pub fn from_config(driver: Arc<dyn Driver>, config: &Config) -> Self {
        Self::new(SessionFactory::new(driver), config.defaults.clone())
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<SharedSession>> {
        self.inner.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Keys with a build in progress or awaited.
    pub fn pending_builds(&self) -> usize {
        self.inner.build_locks.len()
    }

    /// Forgets the entry for `key` if its handle has drained.
    pub fn invalidate(&self, key: &SessionKey) {
        self.inner.invalidate(key);
    }

    /// Returns the handle for `key`, building it on a miss.
    ///
    /// At most one caller builds per key; concurrent callers wait for it and then
    /// see `Lookup::Existing`. A construction failure leaves the cache untouched.
    /// With `Lookup::Created` the caller owns the handle's initial reference and
    /// must eventually release it.
    pub async fn get_or_create(
        &self,
        key: &SessionKey,
    ) -> Result<(Arc<SharedSession>, Lookup), ClusterLinkError> {
        if let Some(handle) = self.get(key) {
            return Ok((handle, Lookup::Existing));
        }

        let lock = self.inner.build_locks.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            match self.get(key) {
                Some(handle) => Ok((handle, Lookup::Existing)),
                None => self.build(key).await.map(|handle| (handle, Lookup::Created)),
            }
        };

        // The map holds the last reference once no caller is waiting on the lock.
        drop(lock);
        self.inner
            .build_locks
            .remove_if(key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn build(&self, key: &SessionKey) -> Result<Arc<SharedSession>, ClusterLinkError> {
        let properties = ConnectionProperties::resolve(key, &self.inner.defaults)?;
        let session = self.inner.factory.create(&properties).await?;

        let weak = Arc::downgrade(&self.inner);
        let registry: Weak<dyn SessionRegistry> = weak;
        let handle = Arc::new(SharedSession::new(key.clone(), properties, session, registry));
        self.inner.entries.insert(key.clone(), handle.clone());
        debug!("Cached new session for {}", key);
        Ok(handle)
    }

    /// Obtains a lease on the shared session for `key`, building it if needed.
    ///
    /// If the cached handle drains between lookup and acquire, the stale entry is
    /// dropped and the lookup is retried.
    pub async fn connect(&self, key: SessionKey) -> Result<SessionLease, ClusterLinkError> {
        loop {
            let (handle, lookup) = self.get_or_create(&key).await?;
            match lookup {
                Lookup::Created => return Ok(SessionLease::adopt(handle)),
                Lookup::Existing if handle.acquire() => return Ok(SessionLease::adopt(handle)),
                Lookup::Existing => {
                    debug!("Cached session for {} drained, retrying lookup", key);
                    self.inner.invalidate(&key);
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Convenience over `connect` for a URL and caller overrides.
    pub async fn connect_url<K, V>(
        &self,
        url: &str,
        overrides: impl IntoIterator<Item = (K, V)>,
    ) -> Result<SessionLease, ClusterLinkError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.connect(SessionKey::new(url, overrides)).await
    }
}
