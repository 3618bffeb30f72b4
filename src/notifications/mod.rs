//! Notification reconciliation.
//!
//! Keeps one newest-first, deduplicated list of notifications fed by the
//! server list, the push channel and the local cache.
//!
//! - [`record`] - the record type and its relative-age label
//! - [`merge`] - transport-independent merge-by-key
//! - [`cache`] - durable local cache
//! - [`alert`] - one-shot alerts for newly arrived records
//! - [`store`] - the store tying them together

pub mod alert;
pub mod cache;
pub mod merge;
pub mod record;
pub mod store;

pub use alert::{AlertPresenter, AlertQueue, LogAlerts};
pub use cache::{FileStore, KeyValueStore, MemoryStore, NotificationCache, PersistenceError};
pub use record::{time_ago, NotificationRecord};
pub use store::NotificationStore;
