//! Identity session lifecycle and the single-writer event loop.
//!
//! A [`Session`] ties one [`ChannelManager`] to one [`NotificationStore`].
//! Pushed records, transport status changes, user commands and the
//! authoritative fetch all arrive in [`Session::run`], which applies them to
//! the store one at a time in arrival order.
//!
//! Other tasks talk to a running session through a cloneable
//! [`SessionHandle`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelManager, PushTransport, TransportStatus};
use crate::notifications::{NotificationRecord, NotificationStore};
use crate::server::{NotificationApi, RequestError};

/// Requests a [`SessionHandle`] sends to the running loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// Mark one notification read.
    MarkRead {
        /// Record id.
        id: String,
        /// Server outcome.
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
    /// Mark every notification read.
    MarkAllRead {
        /// Server outcome.
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
    /// Remove one notification.
    Dismiss {
        /// Record id.
        id: String,
        /// Server outcome.
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
    /// Copy of the current list, newest first.
    Snapshot {
        /// The records.
        reply: oneshot::Sender<Vec<NotificationRecord>>,
    },
}

/// Failure of a command sent through a [`SessionHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The server refused; the local change was rolled back where applicable.
    Request(RequestError),
    /// The session loop is not running.
    SessionClosed,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(e) => write!(f, "{e}"),
            Self::SessionClosed => write!(f, "Session is not running"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(e) => Some(e),
            Self::SessionClosed => None,
        }
    }
}

/// Cloneable handle to a running [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Marks one notification read.
    pub async fn mark_read(&self, id: &str) -> Result<(), CommandError> {
        let id = id.to_string();
        self.request(|reply| SessionCommand::MarkRead { id, reply })
            .await?
            .map_err(CommandError::Request)
    }

    /// Marks every notification read.
    pub async fn mark_all_read(&self) -> Result<(), CommandError> {
        self.request(|reply| SessionCommand::MarkAllRead { reply })
            .await?
            .map_err(CommandError::Request)
    }

    /// Removes one notification.
    pub async fn dismiss(&self, id: &str) -> Result<(), CommandError> {
        let id = id.to_string();
        self.request(|reply| SessionCommand::Dismiss { id, reply })
            .await?
            .map_err(CommandError::Request)
    }

    /// Current list, newest first.
    pub async fn snapshot(&self) -> Result<Vec<NotificationRecord>, CommandError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, CommandError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| CommandError::SessionClosed)?;
        response.await.map_err(|_| CommandError::SessionClosed)
    }
}

/// One identity's realtime notification session.
pub struct Session<A: NotificationApi> {
    manager: Arc<ChannelManager>,
    store: NotificationStore<A>,
    records_rx: mpsc::UnboundedReceiver<NotificationRecord>,
    status_rx: watch::Receiver<TransportStatus>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
    user_id: Option<u64>,
}

impl<A: NotificationApi> std::fmt::Debug for Session<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("manager", &self.manager)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<A: NotificationApi + 'static> Session<A> {
    /// Creates a session with no identity attached.
    pub fn new(transport: Arc<dyn PushTransport>, store: NotificationStore<A>) -> Self {
        let (records_tx, records_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let status_rx = transport.status();
        Self {
            manager: Arc::new(ChannelManager::new(transport, records_tx)),
            store,
            records_rx,
            status_rx,
            commands_tx,
            commands_rx,
            user_id: None,
        }
    }

    /// Handle for sending commands to [`Self::run`].
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.commands_tx.clone(),
        }
    }

    /// The channel manager.
    pub fn manager(&self) -> &Arc<ChannelManager> {
        &self.manager
    }

    /// The notification store.
    pub fn store(&self) -> &NotificationStore<A> {
        &self.store
    }

    /// Identity of the session, if started.
    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    /// Starts the session for `user_id`: claims the cache, rehydrates from
    /// it and attaches the push channel.
    ///
    /// A failed attach is logged; the manager retries once the transport is
    /// connected.
    pub async fn start(&mut self, user_id: u64) {
        self.user_id = Some(user_id);
        self.store.claim(user_id);
        self.store.rehydrate();
        if let Err(e) = self.manager.attach(user_id).await {
            log::warn!("[Session] Push channel not attached yet: {e}");
        }
    }

    /// Switches to another identity. The previous identity is detached and
    /// its cached notifications are removed before the new one attaches.
    pub async fn switch_user(&mut self, user_id: u64) {
        if self.user_id == Some(user_id) {
            return;
        }
        if let Some(previous) = self.user_id {
            log::info!("[Session] Switching from user {previous} to {user_id}");
            self.manager.detach();
            self.store.clear();
        }
        self.start(user_id).await;
    }

    /// Ends the session. On logout the cached notifications are removed.
    pub fn end(&mut self, logout: bool) {
        self.manager.detach();
        if logout {
            self.store.clear();
        }
        self.user_id = None;
    }

    /// Runs the event loop until `shutdown` is cancelled.
    ///
    /// Starts the authoritative fetch first. Local changes that land while it
    /// is in flight are kept when it merges.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let api = Arc::clone(self.store.api());
        let fetch = async move { api.fetch_notifications().await };
        tokio::pin!(fetch);
        let mut fetching = true;
        let mut status_open = true;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,

                result = &mut fetch, if fetching => {
                    fetching = false;
                    match result {
                        Ok(records) => {
                            self.store.merge_fetched(records);
                        }
                        Err(e) => log::warn!("[Session] Keeping cached notifications: {e}"),
                    }
                }

                Some(record) = self.records_rx.recv() => {
                    self.store.add(record);
                }

                changed = self.status_rx.changed(), if status_open => {
                    if changed.is_err() {
                        log::debug!("[Session] Transport status closed");
                        status_open = false;
                        continue;
                    }
                    let status = *self.status_rx.borrow_and_update();
                    log::debug!("[Session] Transport status {status:?}");
                    if let Err(e) = self.manager.handle_status(status).await {
                        log::warn!("[Session] Reattach failed: {e}");
                    }
                }

                Some(command) = self.commands_rx.recv() => {
                    self.apply(command).await;
                }
            }
        }
        log::debug!("[Session] Event loop stopped");
    }

    async fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::MarkRead { id, reply } => {
                let _ = reply.send(self.store.mark_read(&id).await);
            }
            SessionCommand::MarkAllRead { reply } => {
                let _ = reply.send(self.store.mark_all_read().await);
            }
            SessionCommand::Dismiss { id, reply } => {
                let _ = reply.send(self.store.dismiss(&id).await);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.store.records().to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::manager::tests::ProbeTransport;
    use crate::channel::ChannelState;
    use crate::notifications::store::tests::{rec, FakeApi};
    use crate::notifications::{AlertQueue, MemoryStore, NotificationCache};

    struct Fixture {
        probe: Arc<ProbeTransport>,
        api: Arc<FakeApi>,
        kv: MemoryStore,
        session: Session<FakeApi>,
    }

    fn fixture(cached: &[NotificationRecord]) -> Fixture {
        let probe = ProbeTransport::new();
        let api = Arc::new(FakeApi::default());
        let kv = MemoryStore::new();
        let cache = NotificationCache::new(Arc::new(kv.clone()));
        cache.save(cached).unwrap();
        let store = NotificationStore::open(Arc::clone(&api), cache, Arc::new(AlertQueue::new()));
        let session = Session::new(probe.clone(), store);
        Fixture {
            probe,
            api,
            kv,
            session,
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if check() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    fn comment(subject: i64) -> serde_json::Value {
        serde_json::json!({ "chat": { "message_id": subject, "content": "hi", "user": { "name": "Ada" } } })
    }

    #[tokio::test]
    async fn test_start_rehydrates_and_attaches() {
        let mut f = fixture(&[rec("a", 1)]);
        f.session.start(7).await;

        assert_eq!(f.session.store().len(), 1);
        assert_eq!(f.session.manager().attached_user(), Some(7));
        assert_eq!(f.session.user_id(), Some(7));
    }

    #[tokio::test]
    async fn test_run_merges_fetch_and_pushed_records() {
        let mut f = fixture(&[rec("a", 1)]);
        *f.api.fetched.lock().unwrap() = vec![rec("b", 2), rec("a", 1)];
        f.session.start(7).await;
        let handle = f.session.handle();
        let probe = f.probe.clone();

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let mut session = f.session;
        let task = tokio::spawn(async move {
            session.run(token).await;
            session
        });

        probe.emit("private-user.7", "chat.created", comment(42));

        let mut ids = Vec::new();
        for _ in 0..1000 {
            ids = handle
                .snapshot()
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect::<Vec<_>>();
            if ids.len() == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"comment-created:42".to_string()));

        shutdown.cancel();
        let session = task.await.unwrap();
        assert_eq!(session.store().unread_count(), 3);
    }

    #[tokio::test]
    async fn test_handle_reports_rollback() {
        let mut f = fixture(&[rec("a", 1)]);
        f.api.fail_read.lock().unwrap().insert("a".to_string());
        f.session.start(1).await;
        let handle = f.session.handle();

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let mut session = f.session;
        let task = tokio::spawn(async move {
            session.run(token).await;
            session
        });

        let err = handle.mark_read("a").await.unwrap_err();
        assert!(matches!(err, CommandError::Request(_)));
        let records = handle.snapshot().await.unwrap();
        assert!(!records[0].read);

        handle.mark_all_read().await.unwrap();
        assert!(handle.snapshot().await.unwrap().iter().all(|r| r.read));

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(
            handle.snapshot().await.unwrap_err(),
            CommandError::SessionClosed
        );
    }

    #[tokio::test]
    async fn test_status_changes_reattach() {
        let mut f = fixture(&[]);
        f.session.start(3).await;
        let manager = Arc::clone(f.session.manager());
        let probe = f.probe.clone();

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let mut session = f.session;
        let task = tokio::spawn(async move { session.run(token).await });

        probe.status_tx.send_replace(TransportStatus::Unavailable);
        eventually(|| matches!(manager.state(), ChannelState::Attaching { .. })).await;

        probe.status_tx.send_replace(TransportStatus::Connected);
        eventually(|| manager.attached_user() == Some(3)).await;
        assert_eq!(probe.count("subscribe:"), 2);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_outage_seen_only_as_connected_still_resubscribes() {
        let mut f = fixture(&[]);
        f.session.start(3).await;
        let manager = Arc::clone(f.session.manager());
        let probe = f.probe.clone();

        // Both changes land before the loop polls the watch.
        probe.status_tx.send_replace(TransportStatus::Unavailable);
        probe.status_tx.send_replace(TransportStatus::Connected);

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let mut session = f.session;
        let task = tokio::spawn(async move { session.run(token).await });

        eventually(|| probe.count("subscribe:") == 2).await;
        eventually(|| manager.attached_user() == Some(3)).await;
        assert_eq!(probe.listener_count(), 2);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_switch_user_detaches_and_clears_previous() {
        let mut f = fixture(&[rec("a", 1)]);
        f.session.start(1).await;

        f.session.switch_user(2).await;

        let ops = f.probe.ops();
        let leave = ops.iter().position(|o| o == "leave:private-user.1").unwrap();
        let subscribe = ops
            .iter()
            .position(|o| o == "subscribe:private-user.2")
            .unwrap();
        assert!(leave < subscribe);
        assert!(f.session.store().is_empty());
        assert!(NotificationCache::new(Arc::new(f.kv.clone()))
            .load()
            .unwrap()
            .is_empty());
        assert_eq!(f.session.manager().attached_user(), Some(2));
    }

    #[tokio::test]
    async fn test_start_drops_list_cached_for_another_user() {
        let kv = MemoryStore::new();
        let cache = NotificationCache::new(Arc::new(kv.clone()));
        cache.claim(1).unwrap();
        cache.save(&[rec("a", 1)]).unwrap();

        // A later process logged in as someone else.
        let store = NotificationStore::open(
            Arc::new(FakeApi::default()),
            NotificationCache::new(Arc::new(kv.clone())),
            Arc::new(AlertQueue::new()),
        );
        assert_eq!(store.len(), 1);
        let mut session = Session::new(ProbeTransport::new(), store);
        session.start(2).await;

        assert!(session.store().is_empty());
        assert!(cache.load().unwrap().is_empty());
        assert_eq!(cache.owner().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_start_keeps_own_cached_list() {
        let kv = MemoryStore::new();
        let cache = NotificationCache::new(Arc::new(kv.clone()));
        cache.claim(1).unwrap();
        cache.save(&[rec("a", 1)]).unwrap();

        let store = NotificationStore::open(
            Arc::new(FakeApi::default()),
            NotificationCache::new(Arc::new(kv)),
            Arc::new(AlertQueue::new()),
        );
        let mut session = Session::new(ProbeTransport::new(), store);
        session.start(1).await;

        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn test_end_with_logout_clears_cache() {
        let mut f = fixture(&[rec("a", 1)]);
        f.session.start(1).await;

        f.session.end(false);
        assert_eq!(f.session.manager().state(), ChannelState::Detached);
        assert_eq!(f.session.store().len(), 1);

        f.session.start(1).await;
        f.session.end(true);
        assert!(f.session.store().is_empty());
        assert!(f.session.user_id().is_none());
    }
}
