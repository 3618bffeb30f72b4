//! boardsync - realtime notification client for the board.
//!
//! This crate keeps a user's notification list in sync with the board
//! server: it loads the list over HTTP, receives new notifications over a
//! private Pusher channel, caches everything locally and reports request
//! status through a transient feedback banner.
//!
//! # Architecture
//!
//! ```text
//!   PusherTransport ─► ChannelManager ─► Session loop ─► NotificationStore ─► cache
//!                                             ▲                  │
//!   ApiClient ─(feedback)─► FeedbackBus ─► FeedbackSink          └─► AlertPresenter
//! ```
//!
//! # Modules
//!
//! - [`feedback`] - transient request feedback bus and its presentation sink
//! - [`server`] - board API client and wire types
//! - [`channel`] - push transport and per-identity subscription manager
//! - [`notifications`] - record merge, local cache, alerts and the store
//! - [`session`] - identity lifecycle and the single-writer event loop
//! - [`auth`] - credentials and login/logout
//! - [`config`] - configuration loading/saving

// Library modules
pub mod auth;
pub mod channel;
pub mod config;
pub mod constants;
pub mod feedback;
pub mod notifications;
pub mod server;
pub mod session;
pub mod ws;

// Re-export commonly used types
pub use auth::{FileTokenStore, MemoryTokenStore, TokenStore, User};
pub use channel::{ChannelManager, PushTransport, PusherTransport, TransportError, TransportStatus};
pub use config::Config;
pub use feedback::{FeedbackBus, FeedbackSink, TransientMessage};
pub use notifications::{NotificationRecord, NotificationStore};
pub use server::{ApiClient, NotificationApi, RequestError};
pub use session::{Session, SessionHandle};
