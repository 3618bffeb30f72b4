//! End-to-end session tests against a local Pusher-compatible socket.
//!
//! The fake push server accepts one WebSocket, announces a socket id,
//! answers the private subscription and sends an application event when the
//! test asks for it. The board API is served by wiremock.

use std::sync::Arc;
use std::time::Duration;

use boardsync::channel::pusher::ApiAuthorizer;
use boardsync::config::PushConfig;
use boardsync::notifications::{AlertQueue, MemoryStore, NotificationCache};
use boardsync::{
    ApiClient, FeedbackBus, MemoryTokenStore, NotificationStore, PusherTransport, Session,
    TokenStore,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves one connection. Every client frame is forwarded to `seen`; the
/// application event goes out once `trigger` fires.
async fn fake_pusher(
    listener: TcpListener,
    seen: mpsc::UnboundedSender<Value>,
    trigger: oneshot::Receiver<Value>,
) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let established = json!({
        "event": "pusher:connection_established",
        "data": json!({ "socket_id": "123.456", "activity_timeout": 120 }).to_string(),
    });
    ws.send(Message::Text(established.to_string())).await.unwrap();

    let mut trigger = Some(trigger);
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let frame: Value = serde_json::from_str(&text).unwrap();
        let _ = seen.send(frame.clone());

        if frame["event"] == "pusher:subscribe" {
            let channel = frame["data"]["channel"].as_str().unwrap().to_string();
            let succeeded = json!({
                "event": "pusher_internal:subscription_succeeded",
                "channel": channel,
                "data": "{}",
            });
            ws.send(Message::Text(succeeded.to_string())).await.unwrap();

            if let Some(trigger) = trigger.take() {
                let Ok(payload) = trigger.await else { return };
                let event = json!({
                    "event": "chat.created",
                    "channel": channel,
                    "data": payload.to_string(),
                });
                ws.send(Message::Text(event.to_string())).await.unwrap();
            }
        }
    }
}

async fn mock_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/broadcasting/auth"))
        .and(body_json(json!({ "socket_id": "123.456", "channel_name": "private-user.7" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth": "app-key:sig" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "recipient_id": 31,
                "read_at": null,
                "notification": {
                    "id": 3,
                    "title": "New ticket",
                    "created_at": "2024-05-01T10:00:00Z",
                    "message": { "id": 77 }
                }
            }]
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn pushed_comment_and_fetched_list_reach_the_store() {
    let api_server = mock_api().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let push_addr = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let (trigger_tx, trigger_rx) = oneshot::channel();
    tokio::spawn(fake_pusher(listener, seen_tx, trigger_rx));

    let tokens = MemoryTokenStore::new();
    tokens.set_token("tok-1").unwrap();
    let api = ApiClient::with_client(
        reqwest::Client::new(),
        format!("{}/api", api_server.uri()),
        Arc::new(tokens),
        FeedbackBus::new(),
    );

    let push = PushConfig {
        app_key: "app-key".to_string(),
        host: Some(format!("http://{push_addr}")),
        ..PushConfig::default()
    };
    let authorizer = ApiAuthorizer::new(
        api.clone(),
        format!("{}/api/broadcasting/auth", api_server.uri()),
    );
    let transport = Arc::new(PusherTransport::connect(&push, Arc::new(authorizer)));

    let alerts = AlertQueue::new();
    let store = NotificationStore::open(
        Arc::new(api),
        NotificationCache::new(Arc::new(MemoryStore::new())),
        Arc::new(alerts.clone()),
    );
    let mut session = Session::new(transport, store);

    tokio::time::timeout(Duration::from_secs(10), session.start(7))
        .await
        .expect("attach timed out");
    assert_eq!(session.manager().attached_user(), Some(7));

    let subscribe = seen_rx.recv().await.unwrap();
    assert_eq!(subscribe["event"], "pusher:subscribe");
    assert_eq!(subscribe["data"]["channel"], "private-user.7");
    assert_eq!(subscribe["data"]["auth"], "app-key:sig");

    trigger_tx
        .send(json!({
            "chat": {
                "message_id": 77,
                "content": "Looks good",
                "created_at": "2024-05-01T11:00:00Z",
                "user": { "name": "Grace" }
            }
        }))
        .unwrap();

    let handle = session.handle();
    let shutdown = CancellationToken::new();
    let watcher = async {
        let mut records = Vec::new();
        for _ in 0..200 {
            records = handle.snapshot().await.unwrap();
            if records.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        shutdown.cancel();
        records
    };
    let ((), records) = tokio::join!(session.run(shutdown.clone()), watcher);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "comment-created:77");
    assert_eq!(records[0].text, "New comment from Grace: Looks good");
    assert_eq!(records[1].id, "31");

    let pending = alerts.pending();
    assert!(pending.iter().any(|r| r.id == "comment-created:77"));

    session.end(false);
    assert_eq!(session.manager().attached_user(), None);
}
