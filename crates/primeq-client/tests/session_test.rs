// Integration tests for the client against an in-process broker

use primeq_broker::config::UserConfig;
use primeq_broker::{Broker, BrokerConfig};
use primeq_client::{
    ClientError, ConnectionManager, ConnectionTarget, Credentials, OneShotPublisher, OpenMode,
    ReasonCode,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn start_broker(config: BrokerConfig) -> (Arc<Broker>, SocketAddr) {
    let broker = Arc::new(Broker::new(config).unwrap());
    let addr = broker.clone().start().await.unwrap();
    (broker, addr)
}

fn manager(addr: SocketAddr, queue_manager: &str, password: Option<&str>) -> ConnectionManager {
    let target = ConnectionTarget::new(
        queue_manager,
        "DEV.APP.SVRCONN",
        &format!("127.0.0.1({})", addr.port()),
    )
    .unwrap();
    ConnectionManager::new(target, Credentials::new("app", password.map(String::from)))
        .with_client_name("client-tests")
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(2))
}

#[tokio::test]
async fn test_publish_then_receive() {
    let (_broker, addr) = start_broker(BrokerConfig::local()).await;
    let session = manager(addr, "QM1", None).connect().await.unwrap();

    let output = session.open("DEV.QUEUE.1", OpenMode::Output).await.unwrap();
    let input = session.open("DEV.QUEUE.1", OpenMode::Input).await.unwrap();

    let sent = output.publish(b"{\"id\":1,\"value\":\"7\"}".to_vec()).await.unwrap();
    let received = input
        .receive(Duration::from_millis(500))
        .await
        .unwrap()
        .expect("message should be available");

    assert_eq!(received.message_id, sent);
    assert_eq!(received.payload, b"{\"id\":1,\"value\":\"7\"}");
    assert_eq!(session.open_handle_count(), 2);

    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_receive_wait_elapses_with_none() {
    let (_broker, addr) = start_broker(BrokerConfig::local()).await;
    let session = manager(addr, "QM1", None).connect().await.unwrap();
    let input = session.open("DEV.QUEUE.3", OpenMode::Input).await.unwrap();

    let started = Instant::now();
    let received = input.receive(Duration::from_millis(100)).await.unwrap();

    assert!(received.is_none());
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(session.is_connected().await);
}

#[tokio::test]
async fn test_unknown_queue_manager_rejected() {
    let (_broker, addr) = start_broker(BrokerConfig::local()).await;

    let err = manager(addr, "QM9", None).connect().await.unwrap_err();
    assert_eq!(err.reason(), Some(ReasonCode::UnknownQueueManager));
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let mut config = BrokerConfig::local();
    config.users = vec![UserConfig {
        name: "app".to_string(),
        password: Some("passw0rd".to_string()),
    }];
    let (broker, addr) = start_broker(config).await;

    let err = manager(addr, "QM1", Some("wrong")).connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected { .. }));
    assert_eq!(err.reason(), Some(ReasonCode::NotAuthorized));

    let session = manager(addr, "QM1", Some("passw0rd")).connect().await.unwrap();
    assert!(session.is_connected().await);

    let metrics = broker.metrics().render().unwrap();
    assert!(metrics.contains("pq_connects_rejected_total{reason=\"not_authorized\"} 1"));
}

#[tokio::test]
async fn test_nothing_listening_is_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = manager(addr, "QM1", None).connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Connection { .. }));
}

#[tokio::test]
async fn test_open_unknown_queue() {
    let (_broker, addr) = start_broker(BrokerConfig::local()).await;
    let session = manager(addr, "QM1", None).connect().await.unwrap();

    let err = session.open("NO.SUCH.QUEUE", OpenMode::Input).await.unwrap_err();
    assert!(matches!(err, ClientError::Open { .. }));
    assert_eq!(err.reason(), Some(ReasonCode::UnknownQueue));
    assert_eq!(session.open_handle_count(), 0);
}

#[tokio::test]
async fn test_mode_is_enforced_before_sending() {
    let (_broker, addr) = start_broker(BrokerConfig::local()).await;
    let session = manager(addr, "QM1", None).connect().await.unwrap();

    let output = session.open("DEV.QUEUE.2", OpenMode::Output).await.unwrap();
    let err = output.receive(Duration::from_millis(10)).await.unwrap_err();
    assert!(matches!(err, ClientError::ModeNotAllowed { operation: "input", .. }));

    let input = session.open("DEV.QUEUE.2", OpenMode::Input).await.unwrap();
    let err = input.publish(b"x".to_vec()).await.unwrap_err();
    assert!(matches!(err, ClientError::ModeNotAllowed { operation: "output", .. }));

    let both = session.open("DEV.QUEUE.2", OpenMode::InputOutput).await.unwrap();
    both.publish(b"x".to_vec()).await.unwrap();
    assert!(both.receive(Duration::from_millis(100)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (_broker, addr) = start_broker(BrokerConfig::local()).await;
    let session = manager(addr, "QM1", None).connect().await.unwrap();

    let mut handle = session.open("DEV.QUEUE.1", OpenMode::Output).await.unwrap();
    handle.close().await.unwrap();
    handle.close().await.unwrap();

    assert!(handle.is_closed());
    assert_eq!(session.open_handle_count(), 0);

    let err = handle.publish(b"late".to_vec()).await.unwrap_err();
    assert!(matches!(err, ClientError::HandleClosed(_)));
}

#[tokio::test]
async fn test_disconnect_invalidates_handles() {
    let (_broker, addr) = start_broker(BrokerConfig::local()).await;
    let manager = manager(addr, "QM1", None);
    let session = manager.connect().await.unwrap();

    let mut handle = session.open("DEV.QUEUE.1", OpenMode::InputOutput).await.unwrap();
    manager.disconnect(session).await.unwrap();

    let err = handle.publish(b"after".to_vec()).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionClosed));

    // Closing after the session is gone is still fine
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_queue_full_surfaces_reason() {
    let mut config = BrokerConfig::local();
    config.queues[0].max_depth = 1;
    let (_broker, addr) = start_broker(config).await;
    let session = manager(addr, "QM1", None).connect().await.unwrap();

    let output = session.open("DEV.QUEUE.1", OpenMode::Output).await.unwrap();
    output.publish(b"one".to_vec()).await.unwrap();
    let err = output.publish(b"two".to_vec()).await.unwrap_err();

    assert!(matches!(err, ClientError::Publish { .. }));
    assert_eq!(err.reason(), Some(ReasonCode::QueueFull));
    assert!(session.is_connected().await);
}

#[tokio::test]
async fn test_one_shot_publisher_uses_fresh_handles() {
    let (broker, addr) = start_broker(BrokerConfig::local()).await;
    let publisher = OneShotPublisher::new(manager(addr, "QM1", None), "DEV.QUEUE.1");

    for id in 0..3 {
        publisher
            .publish(&json!({ "id": id, "value": "11" }))
            .await
            .unwrap();
    }

    let queue = broker.queues().get("DEV.QUEUE.1").unwrap();
    assert_eq!(queue.depth(), 3);

    let first = queue.try_get().unwrap();
    let record: serde_json::Value = serde_json::from_slice(&first.payload).unwrap();
    assert_eq!(record["id"], 0);

    publisher.shutdown().await;
}
