use super::*;
use crate::config::{Config, PathsConfig};
use crate::display::mock::RecordingTrigger;
use crate::message_log::{LogEntry, MessageStatus};
use crate::provider::mock::MockProvider;
use axum::http::Request;
use tower::ServiceExt;

struct Fixture {
    _dir: tempfile::TempDir,
    service: Arc<MarqueeService>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blacklist.txt"), "grinch\n").unwrap();
    let paths = PathsConfig::default().resolve(dir.path());
    let service = MarqueeService::with_parts(
        Config::default(),
        paths,
        Arc::new(MockProvider::default()),
        Arc::new(RecordingTrigger::default()),
    )
    .unwrap();
    Fixture {
        _dir: dir,
        service: Arc::new(service),
    }
}

fn app(f: &Fixture) -> Router {
    build_router(StatusApiState {
        service: Arc::clone(&f.service),
    })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 65536).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(
    app: Router,
    uri: &str,
    payload: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(payload.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 65536).await.unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint_returns_json() {
    let f = fixture();
    let (status, json) = get_json(app(&f), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], crate::VERSION);
    assert_eq!(json["running"], false);
}

#[tokio::test]
async fn test_status_endpoint_has_every_section() {
    let f = fixture();
    let (status, json) = get_json(app(&f), "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["queue"]["size"], 0);
    assert_eq!(json["coordinator"]["state"], "idle");
    assert_eq!(json["poller"]["consecutive_failures"], 0);
    assert_eq!(json["policy"].as_array().unwrap().len(), 3);
    assert_eq!(json["policy"][0]["list"], "blacklist");
}

#[tokio::test]
async fn test_test_message_queues_name() {
    let f = fixture();
    let (status, json) = post_json(
        app(&f),
        "/api/test/message",
        serde_json::json!({"name": "hello rudolph"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["result"]["outcome"], "queued");
    assert_eq!(json["result"]["name"], "Rudolph");

    let (_, queue) = get_json(app(&f), "/api/queue/status").await;
    assert_eq!(queue["queue_size"], 1);
    assert_eq!(queue["queue"][0]["name"], "Rudolph");
    assert_eq!(queue["queue"][0]["source_phone"], DEFAULT_TEST_PHONE);
}

#[tokio::test]
async fn test_test_message_rejection_reported() {
    let f = fixture();
    let (status, json) = post_json(
        app(&f),
        "/api/test/message",
        serde_json::json!({"name": "Grinch", "phone": "+15550001111"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["result"]["outcome"], "rejected");
    assert_eq!(json["result"]["reason"], "PROFANITY");
    assert!(f.service.queue().is_empty());
}

#[tokio::test]
async fn test_test_message_requires_name() {
    let f = fixture();
    let (status, json) =
        post_json(app(&f), "/api/test/message", serde_json::json!({"name": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "name is required");
}

#[tokio::test]
async fn test_test_message_too_long() {
    let f = fixture();
    let name = "a".repeat(MAX_FIELD_LEN + 1);
    let (status, _) =
        post_json(app(&f), "/api/test/message", serde_json::json!({"name": name})).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_block_and_unblock_phone() {
    let f = fixture();
    let (status, json) = post_json(
        app(&f),
        "/api/phone/block",
        serde_json::json!({"phone": " +15550001111 "}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["changed"], true);
    assert!(f.service.policy().is_phone_blocked("+15550001111"));

    let (_, list) = get_json(app(&f), "/api/blocklist").await;
    assert_eq!(list["phones"], serde_json::json!(["+15550001111"]));

    let (_, again) = post_json(
        app(&f),
        "/api/phone/block",
        serde_json::json!({"phone": "+15550001111"}),
    )
    .await;
    assert_eq!(again["changed"], false);

    let (status, json) = post_json(
        app(&f),
        "/api/phone/unblock",
        serde_json::json!({"phone": "+15550001111"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["changed"], true);
    assert!(!f.service.policy().is_phone_blocked("+15550001111"));
}

#[tokio::test]
async fn test_block_requires_phone() {
    let f = fixture();
    let (status, _) =
        post_json(app(&f), "/api/phone/block", serde_json::json!({"phone": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_block_rejects_malformed_body() {
    let f = fixture();
    let (status, _) =
        post_json(app(&f), "/api/phone/block", serde_json::json!({"number": "1"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_messages_list_and_clear() {
    let f = fixture();
    f.service.log().record(LogEntry::new(
        "SM1",
        "+15550001111",
        "Santa",
        "Santa",
        MessageStatus::Displayed,
    ));

    let (_, json) = get_json(app(&f), "/api/messages").await;
    assert_eq!(json[0]["message_id"], "SM1");
    assert_eq!(json[0]["status"], "displayed");

    let (status, json) = post_json(app(&f), "/api/messages/clear", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert!(f.service.log().entries().is_empty());
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let f = fixture();
    let (tx, rx) = watch::channel(false);
    let handle = start("127.0.0.1", 0, Arc::clone(&f.service), rx)
        .await
        .unwrap();
    tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
