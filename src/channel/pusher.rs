//! Pusher protocol push transport.
//!
//! Speaks Pusher protocol 7 over a single WebSocket, the way Laravel Echo
//! does in the browser. A background task owns the socket; the
//! [`PusherTransport`] handle talks to it through a command channel.
//!
//! # Architecture
//!
//! ```text
//!   PusherTransport ── Command::Subscribe ──►  background task
//!         │            Command::Unsubscribe     (connect, authorize,
//!         │                                      ping, route, reconnect)
//!         │                                            │
//!   listeners registry ◄── (channel, event, data) ─────┘
//!   status watch      ◄── Connecting / Connected / Unavailable
//! ```
//!
//! # Protocol
//!
//! - Waits for `pusher:connection_established` and records `socket_id` and
//!   `activity_timeout`
//! - Private channels are authorized through a [`ChannelAuthorizer`] before
//!   `pusher:subscribe` is sent. Authorization runs in its own task so the
//!   socket keeps being read meanwhile
//! - Answers `pusher:ping`, and pings the server after `activity_timeout` of
//!   silence
//! - Reconnects with exponential backoff. Subscriptions are NOT replayed;
//!   the channel manager reattaches when the status turns `Connected`.

// Rust guideline compliant 2026-02

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::{EventListener, PushTransport, TransportError, TransportStatus};
use crate::config::PushConfig;
use crate::constants;
use crate::server::ApiClient;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Signs private channel subscriptions.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    /// Returns the `auth` signature for `channel` on the connection
    /// identified by `socket_id`.
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<String, TransportError>;
}

/// Authorizes through the board API's broadcasting endpoint.
#[derive(Debug, Clone)]
pub struct ApiAuthorizer {
    api: ApiClient,
    auth_url: String,
}

impl ApiAuthorizer {
    /// Authorizer posting to `auth_url` with the client's bearer token.
    pub fn new(api: ApiClient, auth_url: impl Into<String>) -> Self {
        Self {
            api,
            auth_url: auth_url.into(),
        }
    }
}

#[async_trait]
impl ChannelAuthorizer for ApiAuthorizer {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<String, TransportError> {
        self.api
            .authorize_channel(&self.auth_url, socket_id, channel)
            .await
            .map_err(|e| TransportError::Auth(e.to_string()))
    }
}

type ListenerMap = Arc<Mutex<HashMap<(String, String), EventListener>>>;

/// Outcome of a background channel authorization.
type AuthResult = (String, Result<String, TransportError>);

type Reply = oneshot::Sender<Result<(), TransportError>>;

#[derive(Debug)]
enum Command {
    Subscribe {
        channel: String,
        reply: Reply,
    },
    Unsubscribe {
        channel: String,
    },
}

/// Push transport for Pusher-compatible servers.
///
/// Dropping the handle shuts the background task down.
pub struct PusherTransport {
    commands: mpsc::UnboundedSender<Command>,
    listeners: ListenerMap,
    status_rx: watch::Receiver<TransportStatus>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for PusherTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PusherTransport")
            .field("status", &*self.status_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl PusherTransport {
    /// Spawns the connection task for `config`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(config: &PushConfig, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(TransportStatus::Connecting);
        let listeners: ListenerMap = Arc::default();
        let shutdown = CancellationToken::new();

        let task = ConnectionTask {
            url: build_ws_url(config),
            authorizer,
            listeners: Arc::clone(&listeners),
            status_tx,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(task.run(command_rx));

        Self {
            commands,
            listeners,
            status_rx,
            shutdown,
        }
    }

    /// Stops the background task and closes the socket.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), EventListener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PusherTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl PushTransport for PusherTransport {
    async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                channel: channel.to_string(),
                reply,
            })
            .map_err(|_| TransportError::Closed)?;
        response.await.map_err(|_| TransportError::Closed)?
    }

    fn listen(&self, channel: &str, event: &str, listener: EventListener) {
        self.listeners()
            .insert((channel.to_string(), event.to_string()), listener);
    }

    fn stop_listening(&self, channel: &str, event: &str) {
        self.listeners()
            .remove(&(channel.to_string(), event.to_string()));
    }

    fn leave(&self, channel: &str) {
        self.listeners().retain(|(c, _), _| c != channel);
        let _ = self.commands.send(Command::Unsubscribe {
            channel: channel.to_string(),
        });
    }

    fn status(&self) -> watch::Receiver<TransportStatus> {
        self.status_rx.clone()
    }
}

/// Builds the socket URL for the hosted cluster or a self-hosted server.
pub fn build_ws_url(config: &PushConfig) -> String {
    let base = match &config.host {
        Some(host) => ws::http_to_ws_scheme(host.trim_end_matches('/')),
        None => format!("wss://ws-{}.pusher.com", config.cluster),
    };
    format!(
        "{base}/app/{}?protocol={}&client=boardsync&version={}",
        config.app_key,
        constants::PUSHER_PROTOCOL_VERSION,
        env!("CARGO_PKG_VERSION")
    )
}

/// One Pusher frame. `data` is usually a JSON-encoded string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Frame {
    /// Event name (`pusher:*`, `pusher_internal:*` or an application event).
    pub event: String,
    /// Channel for channel-scoped frames.
    #[serde(default)]
    pub channel: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Parses a text frame.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Payload with a JSON-encoded string unwrapped. Non-JSON strings are
    /// kept as they are.
    pub fn decoded_data(&self) -> Value {
        match &self.data {
            Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| self.data.clone()),
            other => other.clone(),
        }
    }
}

/// Connection parameters announced by `pusher:connection_established`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Established {
    /// Socket id used when authorizing private channels.
    pub socket_id: String,
    /// Seconds of silence after which the client should ping.
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

impl Established {
    fn activity_timeout(&self) -> Duration {
        self.activity_timeout
            .filter(|secs| *secs > 0)
            .map_or(constants::PUSH_DEFAULT_ACTIVITY_TIMEOUT, Duration::from_secs)
    }
}

fn subscribe_message(channel: &str, auth: Option<&str>) -> String {
    let mut data = json!({ "channel": channel });
    if let Some(auth) = auth {
        data["auth"] = Value::String(auth.to_string());
    }
    json!({ "event": "pusher:subscribe", "data": data }).to_string()
}

fn unsubscribe_message(channel: &str) -> String {
    json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }).to_string()
}

fn event_message(event: &str) -> String {
    json!({ "event": event, "data": {} }).to_string()
}

enum LoopExit {
    Shutdown,
    Disconnected,
}

enum FrameOutcome {
    Continue,
    Disconnected,
}

struct ConnectionTask {
    url: String,
    authorizer: Arc<dyn ChannelAuthorizer>,
    listeners: ListenerMap,
    status_tx: watch::Sender<TransportStatus>,
    shutdown: CancellationToken,
}

/// Per-connection bookkeeping.
#[derive(Default)]
struct Session {
    socket_id: String,
    /// Waiting for the authorizer.
    authorizing: HashMap<String, Reply>,
    /// Waiting for `subscription_succeeded`.
    pending: HashMap<String, Reply>,
    subscribed: HashSet<String>,
    awaiting_pong: bool,
}

impl Session {
    fn fail_pending(&mut self, error: &TransportError) {
        for (_, reply) in self.authorizing.drain().chain(self.pending.drain()) {
            let _ = reply.send(Err(error.clone()));
        }
    }
}

impl ConnectionTask {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut backoff = constants::PUSH_INITIAL_BACKOFF;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.status_tx.send_replace(TransportStatus::Connecting);
            log::info!("[Pusher] Connecting to {}", redact(&self.url));

            let connected = tokio::select! {
                result = ws::connect(&self.url) => result,
                () = self.shutdown.cancelled() => break,
            };
            let (mut writer, mut reader) = match connected {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("[Pusher] Connection failed: {e:#} (retry in {}s)", backoff.as_secs());
                    self.status_tx.send_replace(TransportStatus::Unavailable);
                    if !self.idle(backoff, &mut commands).await {
                        break;
                    }
                    backoff = (backoff * 2).min(constants::PUSH_MAX_BACKOFF);
                    continue;
                }
            };

            let Some(established) = wait_for_established(&mut writer, &mut reader).await else {
                log::warn!("[Pusher] No connection_established, reconnecting");
                self.status_tx.send_replace(TransportStatus::Unavailable);
                if !self.idle(backoff, &mut commands).await {
                    break;
                }
                backoff = (backoff * 2).min(constants::PUSH_MAX_BACKOFF);
                continue;
            };

            log::info!("[Pusher] Connected (socket {})", established.socket_id);
            backoff = constants::PUSH_INITIAL_BACKOFF;
            let mut session = Session {
                socket_id: established.socket_id.clone(),
                ..Session::default()
            };
            self.status_tx.send_replace(TransportStatus::Connected);

            let exit = self
                .message_loop(
                    &mut session,
                    established.activity_timeout(),
                    &mut writer,
                    &mut reader,
                    &mut commands,
                )
                .await;

            self.status_tx.send_replace(TransportStatus::Unavailable);
            if let LoopExit::Shutdown = exit {
                session.fail_pending(&TransportError::Closed);
                let _ = writer.close().await;
                break;
            }
            session.fail_pending(&TransportError::Unavailable);
            log::info!("[Pusher] Disconnected, reconnecting in {}s", backoff.as_secs());
            if !self.idle(backoff, &mut commands).await {
                break;
            }
            backoff = (backoff * 2).min(constants::PUSH_MAX_BACKOFF);
        }

        log::info!("[Pusher] Shutdown requested, exiting connection loop");
    }

    /// Waits out a backoff delay, refusing subscriptions meanwhile. Returns
    /// `false` on shutdown.
    async fn idle(&self, delay: Duration, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                () = self.shutdown.cancelled() => return false,
                command = commands.recv() => match command {
                    Some(Command::Subscribe { channel, reply }) => {
                        log::debug!("[Pusher] Refusing subscribe to {channel} while disconnected");
                        let _ = reply.send(Err(TransportError::Unavailable));
                    }
                    Some(Command::Unsubscribe { .. }) => {}
                    None => return false,
                },
            }
        }
    }

    async fn message_loop(
        &self,
        session: &mut Session,
        activity_timeout: Duration,
        writer: &mut WsWriter,
        reader: &mut WsReader,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> LoopExit {
        let activity = tokio::time::sleep(activity_timeout);
        tokio::pin!(activity);
        // Scoped to this connection; results for an old socket id are dropped
        // with it.
        let (auth_tx, mut auth_rx) = mpsc::unbounded_channel::<AuthResult>();

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return LoopExit::Shutdown,

                msg = reader.recv() => {
                    activity.as_mut().reset(tokio::time::Instant::now() + activity_timeout);
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let FrameOutcome::Disconnected = self.handle_text(&text, session, writer).await {
                                return LoopExit::Disconnected;
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = writer.send_pong(data).await;
                        }
                        Some(Ok(WsMessage::Close { code, reason })) => {
                            log::info!("[Pusher] Connection closed by server ({code} {reason})");
                            return LoopExit::Disconnected;
                        }
                        Some(Err(e)) => {
                            log::warn!("[Pusher] WebSocket error: {e:#}");
                            return LoopExit::Disconnected;
                        }
                        None => {
                            log::info!("[Pusher] WebSocket stream ended");
                            return LoopExit::Disconnected;
                        }
                    }
                }

                command = commands.recv() => match command {
                    Some(Command::Subscribe { channel, reply }) => {
                        if let Err(e) = self.subscribe(session, writer, channel, reply, &auth_tx).await {
                            log::warn!("[Pusher] Failed to send subscribe: {e:#}");
                            return LoopExit::Disconnected;
                        }
                    }
                    Some(Command::Unsubscribe { channel }) => {
                        let waiting = session
                            .authorizing
                            .remove(&channel)
                            .into_iter()
                            .chain(session.pending.remove(&channel));
                        for reply in waiting {
                            let _ = reply.send(Err(TransportError::Closed));
                        }
                        if session.subscribed.remove(&channel) {
                            if let Err(e) = writer.send_text(&unsubscribe_message(&channel)).await {
                                log::warn!("[Pusher] Failed to send unsubscribe: {e:#}");
                                return LoopExit::Disconnected;
                            }
                            log::debug!("[Pusher] Left {channel}");
                        }
                    }
                    None => return LoopExit::Shutdown,
                },

                Some((channel, result)) = auth_rx.recv() => {
                    if let Err(e) = self.authorized(session, writer, channel, result).await {
                        log::warn!("[Pusher] Failed to send subscribe: {e:#}");
                        return LoopExit::Disconnected;
                    }
                }

                () = &mut activity => {
                    if session.awaiting_pong {
                        log::warn!("[Pusher] No pong from server, reconnecting");
                        return LoopExit::Disconnected;
                    }
                    if writer.send_text(&event_message("pusher:ping")).await.is_err() {
                        return LoopExit::Disconnected;
                    }
                    session.awaiting_pong = true;
                    activity.as_mut().reset(tokio::time::Instant::now() + constants::PUSH_PONG_TIMEOUT);
                }
            }
        }
    }

    /// Sends `pusher:subscribe` for a public channel, or starts authorizing a
    /// private one. Only a failed socket write is returned as an error.
    async fn subscribe(
        &self,
        session: &mut Session,
        writer: &mut WsWriter,
        channel: String,
        reply: Reply,
        auth_tx: &mpsc::UnboundedSender<AuthResult>,
    ) -> anyhow::Result<()> {
        if session.subscribed.contains(&channel) {
            let _ = reply.send(Ok(()));
            return Ok(());
        }

        if !channel.starts_with(constants::PRIVATE_CHANNEL_PREFIX) {
            return Self::send_subscribe(session, writer, channel, None, reply).await;
        }

        // One authorization per channel; a repeated request takes over the reply.
        if let Some(previous) = session.authorizing.insert(channel.clone(), reply) {
            let _ = previous.send(Err(TransportError::Closed));
            return Ok(());
        }

        let authorizer = Arc::clone(&self.authorizer);
        let socket_id = session.socket_id.clone();
        let auth_tx = auth_tx.clone();
        tokio::spawn(async move {
            let result = authorizer.authorize(&socket_id, &channel).await;
            let _ = auth_tx.send((channel, result));
        });
        Ok(())
    }

    /// Finishes a private subscription once its authorization resolved.
    async fn authorized(
        &self,
        session: &mut Session,
        writer: &mut WsWriter,
        channel: String,
        result: Result<String, TransportError>,
    ) -> anyhow::Result<()> {
        let Some(reply) = session.authorizing.remove(&channel) else {
            log::debug!("[Pusher] Authorization for {channel} no longer wanted");
            return Ok(());
        };
        match result {
            Ok(auth) => {
                Self::send_subscribe(session, writer, channel, Some(&auth), reply).await
            }
            Err(e) => {
                log::warn!("[Pusher] {e}");
                let _ = reply.send(Err(e));
                Ok(())
            }
        }
    }

    async fn send_subscribe(
        session: &mut Session,
        writer: &mut WsWriter,
        channel: String,
        auth: Option<&str>,
        reply: Reply,
    ) -> anyhow::Result<()> {
        if let Err(e) = writer.send_text(&subscribe_message(&channel, auth)).await {
            let _ = reply.send(Err(TransportError::Unavailable));
            return Err(e);
        }
        log::debug!("[Pusher] Sent subscribe for {channel}");
        if let Some(previous) = session.pending.insert(channel, reply) {
            let _ = previous.send(Err(TransportError::Closed));
        }
        Ok(())
    }

    async fn handle_text(&self, text: &str, session: &mut Session, writer: &mut WsWriter) -> FrameOutcome {
        let Some(frame) = Frame::parse(text) else {
            log::warn!(
                "[Pusher] Failed to parse frame: {}",
                text.chars().take(100).collect::<String>()
            );
            return FrameOutcome::Continue;
        };

        match frame.event.as_str() {
            "pusher:ping" => {
                if writer.send_text(&event_message("pusher:pong")).await.is_err() {
                    return FrameOutcome::Disconnected;
                }
            }
            "pusher:pong" => session.awaiting_pong = false,
            "pusher_internal:subscription_succeeded" => {
                if let Some(channel) = frame.channel {
                    log::info!("[Pusher] Subscribed to {channel}");
                    if let Some(reply) = session.pending.remove(&channel) {
                        let _ = reply.send(Ok(()));
                    }
                    session.subscribed.insert(channel);
                }
            }
            "pusher:subscription_error" => {
                let channel = frame.channel.clone().unwrap_or_default();
                let detail = frame.decoded_data().to_string();
                log::error!("[Pusher] Subscription to {channel} rejected: {detail}");
                if let Some(reply) = session.pending.remove(&channel) {
                    let _ = reply.send(Err(TransportError::Rejected(detail)));
                }
            }
            "pusher:error" => {
                let data = frame.decoded_data();
                let code = data.get("code").and_then(Value::as_u64);
                log::warn!("[Pusher] Server error {code:?}: {data}");
                // 4200-4299: reconnect immediately.
                if matches!(code, Some(4200..=4299)) {
                    return FrameOutcome::Disconnected;
                }
            }
            _ => {
                let Some(channel) = frame.channel.as_deref() else {
                    log::trace!("[Pusher] Unhandled frame: {}", frame.event);
                    return FrameOutcome::Continue;
                };
                let listener = self
                    .listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&(channel.to_string(), frame.event.clone()))
                    .cloned();
                match listener {
                    Some(listener) => listener(channel, frame.decoded_data()),
                    None => log::trace!("[Pusher] No listener for {} on {channel}", frame.event),
                }
            }
        }
        FrameOutcome::Continue
    }
}

/// Reads until `pusher:connection_established`. Returns `None` on error,
/// close, or a `pusher:error` before the connection is established.
async fn wait_for_established(writer: &mut WsWriter, reader: &mut WsReader) -> Option<Established> {
    while let Some(msg) = reader.recv().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                let Some(frame) = Frame::parse(&text) else {
                    continue;
                };
                match frame.event.as_str() {
                    "pusher:connection_established" => {
                        return serde_json::from_value(frame.decoded_data())
                            .inspect_err(|e| log::warn!("[Pusher] Bad connection_established: {e}"))
                            .ok();
                    }
                    "pusher:error" => {
                        log::warn!("[Pusher] Server refused connection: {}", frame.decoded_data());
                        return None;
                    }
                    _ => {}
                }
            }
            Ok(WsMessage::Ping(data)) => {
                let _ = writer.send_pong(data).await;
            }
            Ok(WsMessage::Close { .. }) => return None,
            Err(e) => {
                log::warn!("[Pusher] Error waiting for connection_established: {e:#}");
                return None;
            }
        }
    }
    None
}

/// Drops the query string (app key, client version) from log output.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_config() -> PushConfig {
        PushConfig {
            app_key: "abc123".to_string(),
            ..PushConfig::default()
        }
    }

    #[test]
    fn test_build_ws_url_hosted_cluster() {
        let url = build_ws_url(&push_config());
        assert!(url.starts_with("wss://ws-eu.pusher.com/app/abc123?protocol=7&client=boardsync&version="));
    }

    #[test]
    fn test_build_ws_url_self_hosted() {
        let config = PushConfig {
            host: Some("http://localhost:6001/".to_string()),
            ..push_config()
        };
        let url = build_ws_url(&config);
        assert!(url.starts_with("ws://localhost:6001/app/abc123?protocol=7"));
        assert_eq!(redact(&url), "ws://localhost:6001/app/abc123");
    }

    #[test]
    fn test_frame_with_string_data() {
        let frame = Frame::parse(
            r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"123.456\",\"activity_timeout\":30}"}"#,
        )
        .unwrap();
        assert_eq!(frame.event, "pusher:connection_established");
        assert!(frame.channel.is_none());

        let established: Established = serde_json::from_value(frame.decoded_data()).unwrap();
        assert_eq!(established.socket_id, "123.456");
        assert_eq!(established.activity_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_frame_with_object_data_and_channel() {
        let frame = Frame::parse(
            r#"{"event":"chat.created","channel":"private-user.7","data":{"chat":{"message_id":1}}}"#,
        )
        .unwrap();
        assert_eq!(frame.channel.as_deref(), Some("private-user.7"));
        assert_eq!(frame.decoded_data()["chat"]["message_id"], 1);
    }

    #[test]
    fn test_frame_non_json_string_data_is_kept() {
        let frame = Frame::parse(r#"{"event":"x","data":"plain"}"#).unwrap();
        assert_eq!(frame.decoded_data(), Value::String("plain".to_string()));
        assert!(Frame::parse("not json").is_none());
    }

    #[test]
    fn test_activity_timeout_default() {
        let established = Established {
            socket_id: "1.1".to_string(),
            activity_timeout: None,
        };
        assert_eq!(
            established.activity_timeout(),
            constants::PUSH_DEFAULT_ACTIVITY_TIMEOUT
        );
    }

    #[test]
    fn test_subscribe_message_format() {
        let private: Value =
            serde_json::from_str(&subscribe_message("private-user.7", Some("key:sig"))).unwrap();
        assert_eq!(private["event"], "pusher:subscribe");
        assert_eq!(private["data"]["channel"], "private-user.7");
        assert_eq!(private["data"]["auth"], "key:sig");

        let public: Value = serde_json::from_str(&subscribe_message("news", None)).unwrap();
        assert!(public["data"].get("auth").is_none());

        let leave: Value = serde_json::from_str(&unsubscribe_message("news")).unwrap();
        assert_eq!(leave["event"], "pusher:unsubscribe");
        assert_eq!(leave["data"]["channel"], "news");
    }

    #[tokio::test]
    async fn test_subscribe_fails_fast_while_unreachable() {
        struct NoAuth;

        #[async_trait]
        impl ChannelAuthorizer for NoAuth {
            async fn authorize(&self, _: &str, _: &str) -> Result<String, TransportError> {
                Err(TransportError::Auth("unused".to_string()))
            }
        }

        let config = PushConfig {
            host: Some("ws://127.0.0.1:1".to_string()),
            ..push_config()
        };
        let transport = PusherTransport::connect(&config, Arc::new(NoAuth));
        let mut status = transport.status();
        status
            .wait_for(|s| *s == TransportStatus::Unavailable)
            .await
            .unwrap();

        assert_eq!(
            transport.subscribe("private-user.1").await,
            Err(TransportError::Unavailable)
        );
    }
}
