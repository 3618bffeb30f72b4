//! Presentation sink for transient feedback.
//!
//! Holds the one current [`TransientMessage`] and a single expiry task. A new
//! message replaces the old one and re-arms the timer; the previous timer is
//! aborted first so a stale expiry can never clear a newer message.
//!
//! Renderers read [`FeedbackSink::current`] or watch [`FeedbackSink::subscribe`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::bus::{FeedbackBus, FeedbackFn};
use super::{FeedbackKind, TransientMessage};

#[derive(Default)]
struct SinkState {
    current: Option<TransientMessage>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every show/clear; an expiry only applies to its own generation.
    generation: u64,
}

struct Shared {
    state: Mutex<SinkState>,
    tx: watch::Sender<Option<TransientMessage>>,
    expiry: Duration,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show(self: &Arc<Self>, kind: FeedbackKind, text: &str) {
        let message = TransientMessage::new(kind, text);
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.current = Some(message.clone());
        state.timer = self.arm_expiry(state.generation);
        drop(state);

        self.tx.send_replace(Some(message));
    }

    fn clear(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let had_message = state.current.take().is_some();
        drop(state);

        if had_message {
            self.tx.send_replace(None);
        }
    }

    fn arm_expiry(self: &Arc<Self>, generation: u64) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("[Feedback] No runtime available, message will not auto-expire");
            return None;
        };

        let shared = Arc::downgrade(self);
        let expiry = self.expiry;
        Some(runtime.spawn(async move {
            tokio::time::sleep(expiry).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.lock();
            if state.generation != generation {
                return;
            }
            state.current = None;
            state.timer = None;
            drop(state);
            shared.tx.send_replace(None);
        }))
    }
}

/// Owns the current transient message and its expiry.
///
/// Cloning yields another handle to the same message.
#[derive(Clone)]
pub struct FeedbackSink {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FeedbackSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackSink")
            .field("current", &self.current())
            .field("expiry", &self.shared.expiry)
            .finish_non_exhaustive()
    }
}

impl FeedbackSink {
    /// Creates a sink and registers it as the bus's single listener.
    pub fn attach(bus: &FeedbackBus, expiry: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        let shared = Arc::new(Shared {
            state: Mutex::new(SinkState::default()),
            tx,
            expiry,
        });

        bus.register(
            Self::handler(&shared, FeedbackKind::Success),
            Self::handler(&shared, FeedbackKind::Error),
            Self::handler(&shared, FeedbackKind::Loading),
        );

        Self { shared }
    }

    fn handler(shared: &Arc<Shared>, kind: FeedbackKind) -> FeedbackFn {
        let shared = Arc::clone(shared);
        Arc::new(move |text: &str| {
            if kind == FeedbackKind::Loading && text.is_empty() {
                shared.clear();
            } else {
                shared.show(kind, text);
            }
        })
    }

    /// The message currently on display, if any.
    pub fn current(&self) -> Option<TransientMessage> {
        self.shared.lock().current.clone()
    }

    /// Clears the message immediately and cancels the pending expiry.
    pub fn clear(&self) {
        self.shared.clear();
    }

    /// Receiver that observes every change of the current message.
    pub fn subscribe(&self) -> watch::Receiver<Option<TransientMessage>> {
        self.shared.tx.subscribe()
    }

    /// Number of expiry timers still pending (0 or 1).
    pub fn pending_timers(&self) -> usize {
        let state = self.shared.lock();
        usize::from(state.timer.as_ref().is_some_and(|t| !t.is_finished()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> (FeedbackBus, FeedbackSink) {
        let bus = FeedbackBus::new();
        let sink = FeedbackSink::attach(&bus, Duration::from_secs(5));
        (bus, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_then_success_keeps_one_message_and_one_timer() {
        let (bus, sink) = sink();

        bus.loading("x");
        bus.success("y");

        let current = sink.current().expect("message present");
        assert_eq!(current.text, "y");
        assert_eq!(current.kind, FeedbackKind::Success);
        assert_eq!(sink.pending_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_expires_after_delay() {
        let (bus, sink) = sink();

        bus.error("failed");
        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(sink.current().is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.current().is_none());
        assert_eq!(sink.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_message_is_not_cleared_by_stale_timer() {
        let (bus, sink) = sink();

        bus.success("first");
        tokio::time::sleep(Duration::from_secs(4)).await;
        bus.success("second");

        // The first timer would have fired here.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.current().map(|m| m.text), Some("second".to_string()));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(sink.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_loading_clears_and_cancels_timer() {
        let (bus, sink) = sink();

        bus.loading("working");
        assert_eq!(sink.pending_timers(), 1);

        bus.clear();
        assert!(sink.current().is_none());
        assert_eq!(sink.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_clear() {
        let (bus, sink) = sink();

        bus.success("done");
        sink.clear();
        assert!(sink.current().is_none());
        assert_eq!(sink.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_observe_changes() {
        let (bus, sink) = sink();
        let mut rx = sink.subscribe();

        bus.success("saved");
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|m| m.text.clone()),
            Some("saved".to_string())
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn test_without_runtime_message_is_kept_without_timer() {
        let (bus, sink) = sink();
        bus.success("no runtime");
        assert_eq!(sink.current().map(|m| m.text), Some("no runtime".to_string()));
        assert_eq!(sink.pending_timers(), 0);
    }
}
