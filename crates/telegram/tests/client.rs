//! TelegramClient against a local stand-in for the Bot API.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use sb_domain::Error;
use sb_telegram::{BotApi, SendMessageRequest, SetWebhookRequest, TelegramClient};
use serde_json::{json, Value};

#[derive(Default)]
struct Recorded {
    calls: Mutex<Vec<(String, String, Value)>>,
}

async fn bot_method(
    State(rec): State<Arc<Recorded>>,
    Path((bot, method)): Path<(String, String)>,
    body: Option<Json<Value>>,
) -> (StatusCode, Json<Value>) {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    rec.calls.lock().push((bot.clone(), method.clone(), body.clone()));

    if bot != "bot123:good" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "error_code": 401, "description": "Unauthorized"})),
        );
    }

    match method.as_str() {
        "setWebhook" => (StatusCode::OK, Json(json!({"ok": true, "result": true}))),
        "deleteWebhook" => (StatusCode::OK, Json(json!({"ok": true, "result": true}))),
        "getWebhookInfo" => (
            StatusCode::OK,
            Json(json!({"ok": true, "result": {
                "url": "https://bot.example.com/telegram/webhook",
                "has_custom_certificate": false,
                "pending_update_count": 3,
                "max_connections": 40
            }})),
        ),
        "sendMessage" => (
            StatusCode::OK,
            Json(json!({"ok": true, "result": {
                "message_id": 100,
                "chat": {"id": body["chat_id"], "type": "private"},
                "date": 1700000000,
                "text": body["text"]
            }})),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error_code": 404, "description": "Not Found"})),
        ),
    }
}

async fn spawn_api() -> (String, Arc<Recorded>) {
    let rec = Arc::new(Recorded::default());
    let app = Router::new()
        .route("/:bot/:method", post(bot_method))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), rec)
}

fn client(base: &str, token: &str) -> TelegramClient {
    TelegramClient::new(base, token, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn set_webhook_sends_only_present_fields() {
    let (base, rec) = spawn_api().await;
    let api = client(&base, "123:good");

    let ok = api
        .set_webhook(&SetWebhookRequest {
            url: "https://bot.example.com/telegram/webhook".into(),
            max_connections: Some(40),
            secret_token: None,
        })
        .await
        .unwrap();
    assert!(ok);

    let calls = rec.calls.lock();
    let (_, method, body) = &calls[0];
    assert_eq!(method, "setWebhook");
    assert_eq!(body["max_connections"], 40);
    assert!(body.get("secret_token").is_none());
}

#[tokio::test]
async fn webhook_info_and_delete_round_trip() {
    let (base, _rec) = spawn_api().await;
    let api = client(&base, "123:good");

    let info = api.get_webhook_info().await.unwrap();
    assert_eq!(info.pending_update_count, 3);
    assert_eq!(info.max_connections, Some(40));
    assert!(api.delete_webhook().await.unwrap());
}

#[tokio::test]
async fn send_message_returns_sent_message() {
    let (base, _rec) = spawn_api().await;
    let api = client(&base, "123:good");

    let sent = api
        .send_message(&SendMessageRequest::new(55, "hello"))
        .await
        .unwrap();
    assert_eq!(sent.message_id, 100);
    assert_eq!(sent.chat.id, 55);
    assert_eq!(sent.text.as_deref(), Some("hello"));
}

#[tokio::test]
async fn rejected_call_surfaces_description() {
    let (base, _rec) = spawn_api().await;
    let api = client(&base, "123:bad");

    let err = api.get_webhook_info().await.unwrap_err();
    match err {
        Error::Api {
            method,
            description,
        } => {
            assert_eq!(method, "getWebhookInfo");
            assert_eq!(description, "Unauthorized");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_api_is_http_error_without_token() {
    let api = client("http://127.0.0.1:9", "123:topsecret");
    let err = api.delete_webhook().await.unwrap_err();
    assert!(matches!(err, Error::Http(_) | Error::Timeout(_)));
    assert!(!err.to_string().contains("topsecret"));
}
