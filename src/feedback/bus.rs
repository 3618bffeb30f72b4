//! Single-slot feedback bus.
//!
//! [`FeedbackBus::register`] installs one set of three callbacks and replaces
//! whatever was registered before. There is deliberately no list of
//! subscribers: exactly one presentation sink is live at a time.
//!
//! Signalling before anything is registered is a silent no-op, and no call on
//! this type can fail or panic.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Callback invoked with the message text.
pub type FeedbackFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
struct Handlers {
    on_success: FeedbackFn,
    on_error: FeedbackFn,
    on_loading: FeedbackFn,
}

/// Process-wide publish point for transient request status.
///
/// Cloning yields another handle to the same slot.
#[derive(Clone, Default)]
pub struct FeedbackBus {
    slot: Arc<RwLock<Option<Handlers>>>,
}

impl std::fmt::Debug for FeedbackBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackBus")
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl FeedbackBus {
    /// Creates an empty, independent bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide bus.
    pub fn global() -> &'static FeedbackBus {
        static GLOBAL: OnceLock<FeedbackBus> = OnceLock::new();
        GLOBAL.get_or_init(FeedbackBus::new)
    }

    /// Installs the three callbacks, replacing any prior registration.
    pub fn register(&self, on_success: FeedbackFn, on_error: FeedbackFn, on_loading: FeedbackFn) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            log::debug!("[Feedback] Replacing existing registration");
        }
        *slot = Some(Handlers {
            on_success,
            on_error,
            on_loading,
        });
    }

    /// Empties the slot. Later signals are no-ops until the next `register`.
    pub fn unregister(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a set of callbacks is currently installed.
    pub fn is_registered(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Signals a success message.
    pub fn success(&self, text: &str) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_success)(text);
        }
    }

    /// Signals an error message.
    pub fn error(&self, text: &str) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_error)(text);
        }
    }

    /// Signals a loading message. An empty text means "nothing to show".
    pub fn loading(&self, text: &str) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_loading)(text);
        }
    }

    /// Shorthand for `loading("")`.
    pub fn clear(&self) {
        self.loading("");
    }

    // Callbacks run outside the lock so they may re-register.
    fn handlers(&self) -> Option<Handlers> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
