// src/core/factory.rs

//! Builds one live `Session` from resolved `ConnectionProperties`.

use crate::core::codec::CodecRegistry;
use crate::core::driver::{ClusterSpec, Driver, SocketOptions};
use crate::core::errors::{ClusterLinkError, ConnectionFailure};
use crate::core::metrics;
use crate::core::policy::{
    LoadBalancingPolicy, ReconnectionPolicy, RetryPolicy, resolve_policy,
};
use crate::core::properties::ConnectionProperties;
use crate::core::session::Session;
use std::sync::Arc;
use tracing::{debug, info};

/// Stateless session construction on top of a `Driver`.
#[derive(Clone)]
pub struct SessionFactory {
    driver: Arc<dyn Driver>,
}

impl SessionFactory {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Assembles the cluster spec for `props`, applying policies best-effort.
    ///
    /// A malformed policy falls back (load balancing) or is skipped (retry and
    /// reconnection) unless `props.debug` is set, in which case it is an error.
    pub fn cluster_spec(props: &ConnectionProperties) -> Result<ClusterSpec, ConnectionFailure> {
        let mut builder = ClusterSpec::builder()
            .add_contact_points(props.hosts.iter().cloned())
            .with_port(props.port)
            .with_socket_options(SocketOptions {
                connect_timeout: props.connect_timeout,
                read_timeout: props.read_timeout,
                tcp_no_delay: props.tcp_no_delay,
                keep_alive: props.keep_alive,
            });

        if !props.username.is_empty() {
            builder = builder.with_credentials(props.username.as_str(), props.password.as_str());
        }

        let load_balancing = resolve_policy(&props.load_balancing_policy, props.debug, || {
            Some(LoadBalancingPolicy::token_aware_round_robin())
        })?;
        if let Some(policy) = load_balancing {
            debug!("Using load balancing policy {}", policy);
            builder = builder.with_load_balancing_policy(policy);
        }

        if let Some(policy) =
            resolve_policy::<RetryPolicy>(&props.retry_policy, props.debug, || None)?
        {
            debug!("Using retry policy {}", policy);
            builder = builder.with_retry_policy(policy);
        }

        if let Some(policy) = resolve_policy::<ReconnectionPolicy>(
            &props.reconnection_policy,
            props.debug,
            || None,
        )? {
            debug!("Using reconnection policy {}", policy);
            builder = builder.with_reconnection_policy(policy);
        }

        Ok(builder
            .with_codec_registry(CodecRegistry::with_default_coercions())
            .build())
    }

    /// Builds the cluster and opens a session on `props.keyspace`.
    ///
    /// If connecting fails after the cluster was built, the cluster is closed before
    /// the error is returned.
    pub async fn create(&self, props: &ConnectionProperties) -> Result<Session, ClusterLinkError> {
        let result = self.try_create(props).await;
        if result.is_err() {
            metrics::SESSION_CONSTRUCTION_FAILURES_TOTAL.inc();
        }
        result.map_err(ClusterLinkError::from)
    }

    async fn try_create(&self, props: &ConnectionProperties) -> Result<Session, ConnectionFailure> {
        let spec = Self::cluster_spec(props)?;
        let cluster = self.driver.build(spec)?;

        match cluster.connect(props.keyspace.as_deref()).await {
            Ok(inner) => {
                info!(
                    "Connected to cluster {:?}:{} (keyspace {:?})",
                    props.hosts, props.port, props.keyspace
                );
                Ok(Session::new(cluster, inner))
            }
            Err(e) => {
                cluster.close();
                Err(e.into())
            }
        }
    }
}
