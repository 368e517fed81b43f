//! `TelegramChannel` against a mock Bot API server.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ycbot_channel_telegram::TelegramChannel;
use ycbot_channel_telegram::api::TelegramApi;
use ycbot_gateway::ChannelPlugin;
use ycbot_types::{ChannelStatus, OutboundMessage};

const TOKEN: &str = "123:ABC";

fn channel(server: &MockServer) -> TelegramChannel {
    TelegramChannel::with_api(TelegramApi::with_base_url(&server.uri(), TOKEN).unwrap())
}

fn sent_message() -> serde_json::Value {
    json!({
        "ok": true,
        "result": {"message_id": 10, "date": 0, "chat": {"id": 42, "type": "private"}, "text": "ok"}
    })
}

#[tokio::test]
async fn markdown_rejection_falls_back_to_plain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({"parse_mode": "Markdown"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: can't parse entities"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(sent_message()))
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    channel(&server)
        .send(OutboundMessage::markdown(42, "vm_with_*odd_name"))
        .await
        .unwrap();
}

#[tokio::test]
async fn long_message_is_sent_in_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(sent_message()))
        .expect(3)
        .mount(&server)
        .await;

    let line = format!("{}\n", "z".repeat(99));
    channel(&server)
        .send(OutboundMessage::plain(42, line.repeat(100)))
        .await
        .unwrap();
}

#[tokio::test]
async fn plain_send_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let err = channel(&server)
        .send(OutboundMessage::plain(42, "hi"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("403 Forbidden"));
}

#[tokio::test]
async fn start_registers_commands_and_forwards_updates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"id": 1, "is_bot": true, "first_name": "ycbot", "username": "ycbot"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/setMyCommands")))
        .and(body_partial_json(json!({"commands": [{"command": "help"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [{
                "update_id": 500,
                "message": {
                    "message_id": 3,
                    "date": 1700000000,
                    "from": {"id": 42, "is_bot": false, "first_name": "Sam"},
                    "chat": {"id": 42, "type": "private"},
                    "text": "/info",
                    "entities": [{"type": "bot_command", "offset": 0, "length": 5}]
                }
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({"offset": 501})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true, "result": []}))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let channel = channel(&server);
    let (tx, mut rx) = mpsc::channel(8);
    channel.start(tx).await.unwrap();
    assert_eq!(channel.status(), ChannelStatus::Running);

    let inbound = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inbound.chat_id, 42);
    assert_eq!(inbound.command.as_deref(), Some("info"));

    channel.stop().await.unwrap();
    assert_eq!(channel.status(), ChannelStatus::Stopped);
}

#[tokio::test]
async fn start_fails_on_bad_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let channel = channel(&server);
    let (tx, _rx) = mpsc::channel(8);
    assert!(channel.start(tx).await.is_err());
    assert!(matches!(channel.status(), ChannelStatus::Error(_)));
}
