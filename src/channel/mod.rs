//! Realtime push channel.
//!
//! Each logged-in user has one private channel, `private-user.{id}`, carrying
//! two named events. The [`manager::ChannelManager`] keeps at most one
//! subscription with its listener pair per identity; the transport behind it
//! is the [`PushTransport`] seam, implemented for Pusher protocol servers by
//! [`pusher::PusherTransport`].
//!
//! # Architecture
//!
//! ```text
//!   ChannelManager ──subscribe/listen/leave──► PushTransport (PusherTransport)
//!         ▲                                          │
//!         │ TransportStatus (watch)                  │ (channel, event, data)
//!         └──────────────────────────────────────────┤
//!                                                    ▼
//!                                  events::translate → NotificationRecord → mpsc
//! ```
//!
//! Rust guideline compliant 2025-01

pub mod events;
pub mod manager;
pub mod pusher;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::constants;

pub use events::{MalformedEventError, PushEvent};
pub use manager::{ChannelManager, ChannelState};
pub use pusher::PusherTransport;

/// Named events delivered on a user channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A comment was added to an item the user follows.
    CommentCreated,
    /// An item was created for the user.
    ItemCreated,
}

impl EventKind {
    /// Every event a user channel carries.
    pub const ALL: [Self; 2] = [Self::CommentCreated, Self::ItemCreated];

    /// Domain name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommentCreated => "comment-created",
            Self::ItemCreated => "item-created",
        }
    }

    /// Event name as broadcast by the server.
    pub fn wire_event(self) -> &'static str {
        match self {
            Self::CommentCreated => "chat.created",
            Self::ItemCreated => "message.created",
        }
    }

    /// Maps a wire event name back to its kind. A leading `.` (the Echo
    /// namespace-less form) is accepted.
    pub fn from_wire(event: &str) -> Option<Self> {
        let event = event.strip_prefix('.').unwrap_or(event);
        Self::ALL.into_iter().find(|k| k.wire_event() == event)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the private channel for a user.
pub fn channel_name(user_id: u64) -> String {
    format!("{}user.{user_id}", constants::PRIVATE_CHANNEL_PREFIX)
}

/// Connection status reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportStatus {
    /// Connecting or reconnecting.
    #[default]
    Connecting,
    /// Connected; subscriptions can be made.
    Connected,
    /// The connection dropped; subscriptions are gone.
    Unavailable,
}

/// Errors that can occur during push channel operations.
///
/// None of these are fatal: the manager logs them and reattaches once the
/// transport reports [`TransportStatus::Connected`] again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The push server is not reachable right now.
    Unavailable,
    /// The server refused the subscription.
    Rejected(String),
    /// Private channel authorization failed.
    Auth(String),
    /// The transport was shut down.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Push server unavailable"),
            Self::Rejected(msg) => write!(f, "Subscription rejected: {msg}"),
            Self::Auth(msg) => write!(f, "Channel authorization failed: {msg}"),
            Self::Closed => write!(f, "Transport closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Callback for one named event: receives the channel the frame arrived on
/// and the decoded payload.
pub type EventListener = Arc<dyn Fn(&str, serde_json::Value) + Send + Sync>;

/// A push transport with named private channels.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Subscribes to a channel, resolving once the server confirms.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the socket is down, authorization fails
    /// or the server rejects the subscription.
    async fn subscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Registers the listener for `event` on `channel`, replacing any prior one.
    fn listen(&self, channel: &str, event: &str, listener: EventListener);

    /// Removes the listener for `event` on `channel`.
    fn stop_listening(&self, channel: &str, event: &str);

    /// Unsubscribes from a channel.
    fn leave(&self, channel: &str);

    /// Connection status updates.
    fn status(&self) -> watch::Receiver<TransportStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name(7), "private-user.7");
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(EventKind::CommentCreated.wire_event(), "chat.created");
        assert_eq!(EventKind::ItemCreated.wire_event(), "message.created");
        assert_eq!(
            EventKind::from_wire(".chat.created"),
            Some(EventKind::CommentCreated)
        );
        assert_eq!(
            EventKind::from_wire("message.created"),
            Some(EventKind::ItemCreated)
        );
        assert_eq!(EventKind::from_wire("pusher:ping"), None);
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Auth("403".to_string()).to_string(),
            "Channel authorization failed: 403"
        );
        assert_eq!(TransportStatus::default(), TransportStatus::Connecting);
    }
}
