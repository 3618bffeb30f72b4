//! The notification store.
//!
//! Owns the newest-first list and reconciles the three places records come
//! from: the local cache (at startup), the server list (`hydrate`), and the
//! push channel (`add`). Every mutation rewrites the cache; cache failures
//! are logged and the in-memory list stays authoritative.
//!
//! All mutations take `&mut self`, so one owner applies them strictly in the
//! order they arrive.

use std::sync::Arc;

use super::alert::AlertPresenter;
use super::cache::NotificationCache;
use super::merge;
use super::record::NotificationRecord;
use crate::server::{NotificationApi, RequestError};

/// Reconciled, persisted notification list.
pub struct NotificationStore<A: NotificationApi> {
    api: Arc<A>,
    cache: NotificationCache,
    alerts: Arc<dyn AlertPresenter>,
    records: Vec<NotificationRecord>,
}

impl<A: NotificationApi> std::fmt::Debug for NotificationStore<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("records", &self.records.len())
            .field("unread", &self.unread_count())
            .finish_non_exhaustive()
    }
}

impl<A: NotificationApi> NotificationStore<A> {
    /// Creates the store and loads the cached list synchronously.
    pub fn open(api: Arc<A>, cache: NotificationCache, alerts: Arc<dyn AlertPresenter>) -> Self {
        let mut store = Self {
            api,
            cache,
            alerts,
            records: Vec::new(),
        };
        store.rehydrate();
        store
    }

    /// API handle used for server calls.
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Merges the cached list into memory. Returns how many records were new.
    pub fn rehydrate(&mut self) -> usize {
        match self.cache.load() {
            Ok(cached) => {
                let added = merge::merge_by_key(&mut self.records, cached);
                log::debug!("[Store] Rehydrated {added} cached notifications");
                added
            }
            Err(e) => {
                log::warn!("[Store] Ignoring unreadable notification cache: {e}");
                0
            }
        }
    }

    /// Loads the cache, then fetches the server list and merges it.
    ///
    /// On fetch failure the cached view stays in place and the error is
    /// returned.
    pub async fn hydrate(&mut self) -> Result<usize, RequestError> {
        self.rehydrate();
        let fetched = self.api.fetch_notifications().await?;
        Ok(self.merge_fetched(fetched))
    }

    /// Merges a fetched server list. Known ids are left untouched so local
    /// read-state changes made before the fetch resolved survive.
    pub fn merge_fetched(&mut self, fetched: Vec<NotificationRecord>) -> usize {
        let total = fetched.len();
        let added = merge::merge_by_key(&mut self.records, fetched);
        log::info!("[Store] Merged server list: {added} new of {total}");
        if added > 0 {
            self.persist();
        }
        added
    }

    /// Inserts a record unless its id is known. New records are persisted
    /// and presented as an alert once.
    pub fn add(&mut self, record: NotificationRecord) -> bool {
        let presented = record.clone();
        if !merge::insert_sorted(&mut self.records, record) {
            log::debug!("[Store] Ignoring duplicate notification {}", presented.id);
            return false;
        }
        self.persist();
        self.alerts.present(&presented);
        true
    }

    /// Marks one record read, rolling the flag back if the server refuses.
    pub async fn mark_read(&mut self, id: &str) -> Result<(), RequestError> {
        let previous = self.set_read(id, true);
        if previous == Some(false) {
            self.persist();
        }

        if let Err(e) = self.api.mark_read(id).await {
            if previous == Some(false) && self.set_read(id, false).is_some() {
                log::warn!("[Store] Rolled back read flag of {id}: {e}");
                self.persist();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Marks every record read, rolling back the ones this call flipped if
    /// the server refuses.
    pub async fn mark_all_read(&mut self) -> Result<(), RequestError> {
        let flipped: Vec<String> = self
            .records
            .iter_mut()
            .filter(|r| !r.read)
            .map(|r| {
                r.read = true;
                r.id.clone()
            })
            .collect();
        if !flipped.is_empty() {
            self.persist();
        }

        if let Err(e) = self.api.mark_all_read().await {
            let mut restored = 0;
            for id in &flipped {
                if self.set_read(id, false).is_some() {
                    restored += 1;
                }
            }
            if restored > 0 {
                log::warn!("[Store] Rolled back {restored} read flags: {e}");
                self.persist();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Removes a record locally and asks the server to delete it.
    ///
    /// The local removal is not undone if the server call fails; the record
    /// comes back with the next server list at worst.
    pub async fn dismiss(&mut self, id: &str) -> Result<(), RequestError> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() != before {
            self.persist();
        }

        self.api.delete_notification(id).await.inspect_err(|e| {
            log::warn!("[Store] Server did not delete {id}: {e}");
        })
    }

    /// Binds the cache to `user_id`. Another user's records are dropped
    /// from the cache and from memory. Returns whether anything was dropped.
    pub fn claim(&mut self, user_id: u64) -> bool {
        match self.cache.claim(user_id) {
            Ok(true) => {
                log::info!("[Store] Dropped notifications cached for another user");
                self.records.clear();
                true
            }
            Ok(false) => false,
            Err(e) => {
                log::warn!("[Store] Could not check notification cache owner: {e}");
                false
            }
        }
    }

    /// Empties memory and the cache (logout).
    pub fn clear(&mut self) {
        self.records.clear();
        if let Err(e) = self.cache.clear() {
            log::warn!("[Store] Failed to clear notification cache: {e}");
        }
    }

    /// Records, newest first.
    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    /// Looks up a record by id.
    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Number of unread records, counted on every call.
    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|r| !r.read).count()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sets the read flag, returning the previous value if the record exists.
    fn set_read(&mut self, id: &str, read: bool) -> Option<bool> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .map(|r| std::mem::replace(&mut r.read, read))
    }

    fn persist(&self) {
        if let Err(e) = self.cache.save(&self.records) {
            log::warn!("[Store] Failed to persist notifications: {e}");
        }
    }
}
