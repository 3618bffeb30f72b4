//! One-shot alert presentation for newly arrived notifications.
//!
//! Distinct from the transient feedback banner: an alert is a durable,
//! dismissable notice shown once when a record first enters the store.

use std::sync::{Arc, Mutex, PoisonError};

use super::record::NotificationRecord;

/// Presents a newly added notification to the user.
pub trait AlertPresenter: Send + Sync {
    /// Called once per record that was actually inserted.
    fn present(&self, record: &NotificationRecord);
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerts;

impl AlertPresenter for LogAlerts {
    fn present(&self, record: &NotificationRecord) {
        log::info!(
            "[Alert] {} (subject {}, id {})",
            record.text,
            record.subject_id,
            record.id
        );
    }
}

/// Collects presented records in memory; the caller dismisses them.
#[derive(Debug, Clone, Default)]
pub struct AlertQueue {
    pending: Arc<Mutex<Vec<NotificationRecord>>>,
}

impl AlertQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts not yet dismissed, oldest first.
    pub fn pending(&self) -> Vec<NotificationRecord> {
        self.lock().clone()
    }

    /// Dismisses the alert for `id`. Returns whether one was pending.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|r| r.id != id);
        pending.len() != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<NotificationRecord>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AlertPresenter for AlertQueue {
    fn present(&self, record: &NotificationRecord) {
        self.lock().push(record.clone());
    }
}
