// HTTP API tests against an in-process broker

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use primeq_broker::{Broker, BrokerConfig};
use primeq_client::{ConnectionManager, ConnectionTarget, Credentials, Envelope, OneShotPublisher};
use primeq_core::{ResultRecord, WorkRecord};
use primeq_frontend::api::SendResponse;
use primeq_frontend::{create_router, AppState, MemoryRecordStore, RecordStore};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Fixture {
    broker: Arc<Broker>,
    store: Arc<MemoryRecordStore>,
    app: Router,
}

async fn fixture() -> Fixture {
    let broker = Arc::new(Broker::new(BrokerConfig::local()).unwrap());
    let addr = broker.clone().start().await.unwrap();

    let target = ConnectionTarget::new(
        "QM1",
        "DEV.APP.SVRCONN",
        &format!("127.0.0.1({})", addr.port()),
    )
    .unwrap();
    let manager = ConnectionManager::new(target, Credentials::new("app", None))
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));

    let store = Arc::new(MemoryRecordStore::new());
    let state = Arc::new(AppState {
        store: store.clone(),
        publisher: OneShotPublisher::new(manager.clone(), "DEV.QUEUE.1"),
        manager,
        results_queue: "DEV.QUEUE.2".to_string(),
        results_wait: Duration::from_millis(100),
    });

    Fixture {
        broker,
        store,
        app: create_router(state),
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn json<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_list_and_get_records() {
    let fx = fixture().await;
    fx.store.set(&WorkRecord::new(2, "13")).await.unwrap();
    fx.store.set(&WorkRecord::new(1, "12")).await.unwrap();

    let (status, body) = call(&fx.app, "GET", "/records", None).await;
    assert_eq!(status, StatusCode::OK);
    let records: Vec<WorkRecord> = json(&body);
    assert_eq!(records, vec![WorkRecord::new(1, "12"), WorkRecord::new(2, "13")]);

    let (status, body) = call(&fx.app, "GET", "/records/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json::<WorkRecord>(&body), WorkRecord::new(2, "13"));

    let (status, _) = call(&fx.app, "GET", "/records/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_record_validates_value() {
    let fx = fixture().await;

    let (status, _) = call(&fx.app, "POST", "/records", Some(r#"{"id": 5, "value": "101"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(fx.store.get(5).await.unwrap(), Some(WorkRecord::new(5, "101")));

    let (status, _) = call(&fx.app, "POST", "/records", Some(r#"{"id": 6, "value": "1e9"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(fx.store.get(6).await.unwrap().is_none());

    let (status, _) = call(&fx.app, "POST", "/records", Some(r#"{"id": 0, "value": "7"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn test_generate_after_highest_id_is_refused() {
    let fx = fixture().await;
    let body = format!(r#"{{"id": {}, "value": "7"}}"#, u64::MAX);

    let (status, _) = call(&fx.app, "POST", "/records", Some(&body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &fx.app,
        "POST",
        "/records/generate",
        Some(r#"{"count": 2, "max_digits": 8}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = json(&body);
    assert!(error["error"].as_str().unwrap().contains("ids"));
    assert_eq!(fx.store.len(), 1);

    // The service keeps answering
    let (status, _) = call(&fx.app, "GET", "/records", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_generate_records() {
    let fx = fixture().await;

    let (status, body) = call(
        &fx.app,
        "POST",
        "/records/generate",
        Some(r#"{"count": 4, "max_digits": 8}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let records: Vec<WorkRecord> = json(&body);
    assert_eq!(records.len(), 4);
    assert_eq!(fx.store.len(), 4);

    let (status, _) = call(&fx.app, "POST", "/records/generate", Some(r#"{"count": 0}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_publishes_every_record() {
    let fx = fixture().await;
    for id in 1..=25 {
        fx.store.set(&WorkRecord::new(id, id.to_string())).await.unwrap();
    }

    let (status, body) = call(&fx.app, "POST", "/records/send", None).await;
    assert_eq!(status, StatusCode::OK);

    let response: SendResponse = json(&body);
    assert_eq!(response.sent, 25);
    assert_eq!(response.failed, 0);
    assert_eq!(response.queue, "DEV.QUEUE.1");

    let queue = fx.broker.queues().get("DEV.QUEUE.1").unwrap();
    assert_eq!(queue.depth(), 25);

    let mut ids = Vec::new();
    while let Some(envelope) = queue.try_get() {
        ids.push(WorkRecord::from_payload(&envelope.payload).unwrap().id);
    }
    ids.sort();
    assert_eq!(ids, (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_results_drains_up_to_limit() {
    let fx = fixture().await;
    let queue = fx.broker.queues().get("DEV.QUEUE.2").unwrap();
    for id in 1..=3 {
        let result = ResultRecord {
            id,
            value: "7".to_string(),
            prime: true,
        };
        queue.put(Envelope::new(result.to_payload().unwrap())).unwrap();
    }
    queue.put(Envelope::new(b"garbage".to_vec())).unwrap();

    let (status, body) = call(&fx.app, "GET", "/results?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let results: Vec<ResultRecord> = json(&body);
    assert_eq!(results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);

    let (status, body) = call(&fx.app, "GET", "/results", None).await;
    assert_eq!(status, StatusCode::OK);
    let results: Vec<ResultRecord> = json(&body);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, 3);
    assert_eq!(queue.depth(), 0);
}

#[tokio::test]
async fn test_health() {
    let fx = fixture().await;
    let (status, body) = call(&fx.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = json(&body);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["queue"], "DEV.QUEUE.1");
}
