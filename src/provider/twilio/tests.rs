use super::*;
use serde_json::json;
use wiremock::matchers::{basic_auth, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> TwilioProvider {
    TwilioProvider::new(TwilioConfig {
        account_sid: "AC123".into(),
        auth_token: "secret".into(),
        phone_number: "+15550001111".into(),
        api_base_url: server.uri(),
        ..TwilioConfig::default()
    })
}

fn message(sid: &str, from: &str, body: &str, sent: &str, direction: &str) -> serde_json::Value {
    json!({
        "sid": sid,
        "from": from,
        "to": "+15550001111",
        "body": body,
        "direction": direction,
        "date_sent": sent,
        "date_created": sent
    })
}

const T5: &str = "Tue, 16 Dec 2025 18:04:05 +0000";
const T6: &str = "Tue, 16 Dec 2025 18:04:06 +0000";
const T7: &str = "Tue, 16 Dec 2025 18:04:07 +0000";

#[tokio::test]
async fn test_fetch_returns_inbound_oldest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .and(query_param("To", "+15550001111"))
        .and(query_param("PageSize", "20"))
        .and(basic_auth("AC123", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                message("SM3", "+15552223333", "Rudolph", T7, "inbound"),
                message("SM2", "+15550001111", "Thanks!", T6, "outbound-api"),
                message("SM1", "+15552223333", "Santa", T5, "inbound"),
            ]
        })))
        .mount(&server)
        .await;

    let messages = provider(&server)
        .fetch_messages_since(&Cursor::default())
        .await
        .unwrap();
    let ids: Vec<&str> = messages.iter().map(|m| m.provider_message_id.as_str()).collect();
    assert_eq!(ids, vec!["SM1", "SM3"]);
    assert_eq!(messages[0].body, "Santa");
    assert_eq!(messages[0].from_phone, "+15552223333");
    assert_eq!(
        messages[0].received_at.to_rfc3339(),
        "2025-12-16T18:04:05+00:00"
    );
}

#[tokio::test]
async fn test_fetch_skips_messages_before_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                message("SM2", "+15552223333", "New", "Tue, 16 Dec 2025 18:10:00 +0000", "inbound"),
                message("SM1", "+15552223333", "Old", "Tue, 16 Dec 2025 18:00:00 +0000", "inbound"),
            ]
        })))
        .mount(&server)
        .await;

    let cursor = Cursor {
        last_received_at: DateTime::parse_from_rfc3339("2025-12-16T18:05:00Z")
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        last_message_id: Some("SM1".into()),
        initialized: true,
    };
    let messages = provider(&server).fetch_messages_since(&cursor).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].provider_message_id, "SM2");
}

#[tokio::test]
async fn test_fetch_unauthorized_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad creds"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .fetch_messages_since(&Cursor::default())
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_fetch_server_error_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = provider(&server)
        .fetch_messages_since(&Cursor::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarqueeError::ProviderFetch {
            retryable: true,
            ..
        }
    ));
}

#[tokio::test]
async fn test_fetch_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"messages": []}))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let provider = TwilioProvider::new(TwilioConfig {
        account_sid: "AC123".into(),
        auth_token: "secret".into(),
        phone_number: "+15550001111".into(),
        api_base_url: server.uri(),
        timeout_secs: 1,
        ..TwilioConfig::default()
    });
    let err = provider
        .fetch_messages_since(&Cursor::default())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_send_sms_posts_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .and(basic_auth("AC123", "secret"))
        .and(body_string_contains("To=%2B15552223333"))
        .and(body_string_contains("From=%2B15550001111"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SMout"})))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server)
        .send_sms("+15552223333", "Thanks!")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_sms_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid To"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .send_sms("not-a-phone", "Thanks!")
        .await
        .unwrap_err();
    assert!(matches!(err, MarqueeError::ProviderSend(ref m) if m.contains("invalid To")));
}

#[test]
fn test_cursor_advance_only_moves_forward() {
    let at = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);
    let msg = |id: &str, ts: &str| InboundMessage {
        provider_message_id: id.into(),
        from_phone: "+1".into(),
        body: String::new(),
        received_at: at(ts),
    };
    let mut cursor = Cursor::default();
    assert!(!cursor.is_initialized());
    cursor.advance(&msg("SM2", "2025-12-16T18:10:00Z"));
    cursor.advance(&msg("SM1", "2025-12-16T18:00:00Z"));
    assert_eq!(cursor.last_message_id.as_deref(), Some("SM2"));
    assert_eq!(cursor.last_received_at, Some(at("2025-12-16T18:10:00Z")));
}
