//! Transient request feedback.
//!
//! Lets low-level networking code report loading/success/error status without
//! holding a reference to whatever renders it.
//!
//! ```text
//!   ApiClient::execute ──► FeedbackBus ──► FeedbackSink ──► watch::Receiver
//!   (loading/clear/         (single          (one current     (renderer)
//!    success/error)          slot)            message + timer)
//! ```
//!
//! - [`bus`] - the registration slot and the signalling calls
//! - [`sink`] - holds the current [`TransientMessage`] and expires it

pub mod bus;
pub mod sink;

pub use bus::{FeedbackBus, FeedbackFn};
pub use sink::FeedbackSink;

use chrono::{DateTime, Utc};

/// Kind of a transient status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackKind {
    /// A request completed and the server reported something worth showing.
    Success,
    /// A request failed.
    Error,
    /// A request is in flight.
    Loading,
}

impl FeedbackKind {
    /// Short lowercase label, used by text renderers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Loading => "loading",
        }
    }
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A short-lived status notice. At most one is live at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientMessage {
    /// Text to render.
    pub text: String,
    /// Message kind.
    pub kind: FeedbackKind,
    /// When the message was shown.
    pub created_at: DateTime<Utc>,
}

impl TransientMessage {
    /// Builds a message stamped with the current time.
    pub fn new(kind: FeedbackKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
            created_at: Utc::now(),
        }
    }
}
