// tests/integration/tcp_driver_test.rs

//! Integration tests for the TCP driver against local listeners

use super::test_helpers::init_tracing;
use clusterlink::core::driver::{ClusterSpec, Driver, SocketOptions, TcpDriver};
use clusterlink::core::errors::{ClusterLinkError, ConnectionFailure, DriverError};
use clusterlink::core::{SessionCache, SessionFactory};
use clusterlink::config::DriverDefaults;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Binds a listener on an ephemeral port and accepts connections in the background.
async fn listener() -> (u16, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (port, accept)
}

/// A port nothing listens on.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn spec(hosts: &[&str], port: u16) -> ClusterSpec {
    ClusterSpec::builder()
        .add_contact_points(hosts.iter().copied())
        .with_port(port)
        .with_socket_options(SocketOptions {
            connect_timeout: Duration::from_secs(2),
            ..SocketOptions::default()
        })
        .build()
}

#[tokio::test]
async fn test_connects_to_every_reachable_contact_point() {
    init_tracing();
    let (port, accept) = listener().await;

    let cluster = TcpDriver.build(spec(&["127.0.0.1", "localhost"], port)).unwrap();
    let session = cluster.connect(Some("ks")).await.unwrap();

    assert!(session.open_connections() >= 1);
    assert_eq!(session.keyspace(), Some("ks"));

    session.close();
    assert!(session.is_closed());
    assert_eq!(session.open_connections(), 0);
    cluster.close();
    assert!(cluster.is_closed());
    accept.abort();
}

#[tokio::test]
async fn test_partial_reachability_still_connects() {
    let (port, accept) = listener().await;

    // One unresolvable contact point does not fail the session.
    let cluster = TcpDriver
        .build(spec(&["127.0.0.1", "no-such-host.invalid"], port))
        .unwrap();
    let session = cluster.connect(None).await.unwrap();
    assert_eq!(session.open_connections(), 1);
    assert_eq!(session.keyspace(), None);

    cluster.close();
    assert_eq!(session.open_connections(), 0);
    accept.abort();
}

#[tokio::test]
async fn test_no_reachable_host_fails() {
    let port = closed_port().await;
    let cluster = TcpDriver.build(spec(&["127.0.0.1"], port)).unwrap();

    match cluster.connect(None).await {
        Err(DriverError::NoHostAvailable(detail)) => assert!(detail.contains("127.0.0.1")),
        Err(other) => panic!("expected NoHostAvailable, got {other:?}"),
        Ok(_) => panic!("expected the connect to fail"),
    }
}

#[tokio::test]
async fn test_connect_after_close_fails() {
    let (port, accept) = listener().await;
    let cluster = TcpDriver.build(spec(&["127.0.0.1"], port)).unwrap();
    cluster.close();
    cluster.close();

    assert!(matches!(cluster.connect(None).await, Err(DriverError::Closed)));
    accept.abort();
}

#[test]
fn test_build_validates_spec() {
    assert!(matches!(
        TcpDriver.build(spec(&[], 9042)),
        Err(DriverError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        TcpDriver.build(spec(&["127.0.0.1"], 0)),
        Err(DriverError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn test_cache_over_tcp_round_trip() {
    let (port, accept) = listener().await;
    let cache = SessionCache::new(
        SessionFactory::new(Arc::new(TcpDriver)),
        DriverDefaults::default(),
    );

    let url = format!("jdbc:cassandra://127.0.0.1:{port}/ks?connecttimeout=2000");
    let lease = cache.connect_url(&url, Vec::<(String, String)>::new()).await.unwrap();
    assert_eq!(lease.session().open_connections(), 1);
    assert_eq!(lease.properties().port, port);

    let handle = lease.handle().clone();
    drop(lease);
    assert!(handle.session().is_closed());
    assert_eq!(handle.session().open_connections(), 0);
    assert!(cache.is_empty());
    accept.abort();
}

#[tokio::test]
async fn test_refused_connection_is_non_transient() {
    let port = closed_port().await;
    let cache = SessionCache::new(
        SessionFactory::new(Arc::new(TcpDriver)),
        DriverDefaults::default(),
    );

    let url = format!("jdbc:cassandra://127.0.0.1:{port}/ks");
    let err = cache
        .connect_url(&url, Vec::<(String, String)>::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClusterLinkError::NonTransientConnection(ConnectionFailure::Driver(
            DriverError::NoHostAvailable(_)
        ))
    ));
    assert!(cache.is_empty());
}
