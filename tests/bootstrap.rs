//! Startup, failure and release behavior of the server handle.

use std::io;

use tokio::net::TcpListener;

use zknode::config::FailurePolicy;
use zknode::lifecycle::startup;
use zknode::{StartupError, TestingServer};

mod common;

#[tokio::test]
async fn test_bootstrap_leaves_listening_server() {
    let server = startup::bootstrap(&common::loopback_config()).await.unwrap();

    assert_eq!(common::four_letter(server.client_addr(), "ruok").await, "imok");
    let stats = server.stats();
    assert_eq!(stats.znode_count, 3);
    assert_eq!(stats.session_count, 0);

    server.close().await.unwrap();
}

#[tokio::test]
async fn test_unready_server_is_released() {
    let err = startup::bootstrap_with(&common::loopback_config(), |_, _| async {
        Err(io::Error::new(io::ErrorKind::TimedOut, "readiness probe timed out"))
    })
    .await
    .unwrap_err();

    let addr = match &err {
        StartupError::NotReady { addr, .. } => *addr,
        other => panic!("expected NotReady, got {other}"),
    };
    let mut diagnostic = Vec::new();
    startup::report_failure(&err, &mut diagnostic);
    let diagnostic = String::from_utf8(diagnostic).unwrap();
    assert!(diagnostic.contains("caused by: readiness probe timed out"));

    // the half-started server no longer holds the port
    assert!(TcpListener::bind(addr).await.is_ok());
}

#[tokio::test]
async fn test_port_conflict_is_reported_not_raised() {
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = common::loopback_config();
    config.listener.port = holder.local_addr().unwrap().port();

    let err = startup::bootstrap(&config).await.unwrap_err();
    assert!(matches!(err, StartupError::Bind { .. }));

    let mut diagnostic = Vec::new();
    startup::report_failure(&err, &mut diagnostic);
    let diagnostic = String::from_utf8(diagnostic).unwrap();
    assert!(diagnostic.starts_with("startup failed: "));
    assert!(diagnostic.contains("caused by:"));

    assert!(startup::handle_failure(err, FailurePolicy::Log).is_ok());
}

#[tokio::test]
async fn test_port_is_free_after_failed_start() {
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();
    let mut config = common::loopback_config();
    config.listener.port = port;

    assert!(TestingServer::start(config.clone()).await.is_err());
    drop(holder);

    let server = TestingServer::start(config).await.unwrap();
    assert_eq!(server.port(), port);
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_drop_releases_port() {
    let server = common::start_server().await;
    let port = server.port();
    drop(server);

    // the accept task is aborted asynchronously
    let mut rebound = None;
    for _ in 0..50 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            rebound = Some(listener);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(rebound.is_some());
}

#[tokio::test]
async fn test_nothing_survives_a_restart() {
    let server = common::start_server().await;
    let mut client = common::Client::connect(server.client_addr()).await;
    client.create("/left-behind", b"data", 0).await.unwrap();
    client.close().await;
    server.close().await.unwrap();

    let server = common::start_server().await;
    let mut client = common::Client::connect(server.client_addr()).await;
    assert!(client.exists("/left-behind", false).await.is_err());
    assert_eq!(server.stats().znode_count, 3);
    client.close().await;
    server.close().await.unwrap();
}
