//! Per-identity channel subscription lifecycle.
//!
//! [`ChannelManager`] owns the `Detached → Attaching → Attached` state
//! machine for the private user channel. A generation number is taken for
//! every subscribe attempt; when an attempt resolves after a teardown or an
//! identity switch, its generation no longer matches and the result is
//! released instead of applied. That makes `attach` safe to call repeatedly
//! and concurrently: at most one listener pair is ever registered.
//!
//! The state lock is a std [`Mutex`] and is never held across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::mpsc;

use super::{channel_name, events, EventKind, EventListener, PushTransport, TransportError, TransportStatus};
use crate::notifications::NotificationRecord;

/// Subscription state for the current identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No identity attached.
    #[default]
    Detached,
    /// Subscribing, or waiting for the transport to come back.
    Attaching {
        /// Identity being attached.
        user_id: u64,
        /// Attempt generation.
        generation: u64,
        /// Whether a subscribe call is outstanding.
        in_flight: bool,
    },
    /// Subscribed with both listeners registered.
    Attached {
        /// Attached identity.
        user_id: u64,
        /// Generation of the attempt that attached.
        generation: u64,
    },
}

impl ChannelState {
    /// Identity this state belongs to, if any.
    pub fn user_id(&self) -> Option<u64> {
        match *self {
            Self::Detached => None,
            Self::Attaching { user_id, .. } | Self::Attached { user_id, .. } => Some(user_id),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ChannelState,
    last_generation: u64,
}

impl Inner {
    fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }
}

/// Keeps at most one subscription and listener pair per identity.
pub struct ChannelManager {
    transport: Arc<dyn PushTransport>,
    records: mpsc::UnboundedSender<NotificationRecord>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Creates a detached manager. Translated records are sent to `records`.
    pub fn new(
        transport: Arc<dyn PushTransport>,
        records: mpsc::UnboundedSender<NotificationRecord>,
    ) -> Self {
        Self {
            transport,
            records,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The transport this manager drives.
    pub fn transport(&self) -> &Arc<dyn PushTransport> {
        &self.transport
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    /// Identity with a live subscription, if any.
    pub fn attached_user(&self) -> Option<u64> {
        match self.lock().state {
            ChannelState::Attached { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// Attaches the channel for `user_id`.
    ///
    /// A no-op when the same identity is already attaching or attached. A
    /// different identity is torn down first.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the subscribe attempt fails. The
    /// identity stays in `Attaching` and is retried on the next
    /// [`TransportStatus::Connected`].
    pub async fn attach(&self, user_id: u64) -> Result<(), TransportError> {
        let generation = {
            let mut inner = self.lock();
            if inner.state.user_id() == Some(user_id) {
                log::debug!("[Channel] User {user_id} already attaching or attached");
                return Ok(());
            }
            self.teardown(&mut inner);
            let generation = inner.next_generation();
            inner.state = ChannelState::Attaching {
                user_id,
                generation,
                in_flight: true,
            };
            generation
        };
        self.run_attempt(user_id, generation).await
    }

    /// Stops both listeners, leaves the channel and becomes `Detached`.
    pub fn detach(&self) {
        let mut inner = self.lock();
        self.teardown(&mut inner);
        inner.state = ChannelState::Detached;
    }

    /// Reacts to a transport status change.
    ///
    /// `Unavailable` drops the listeners of an attached identity and goes
    /// back to `Attaching`. `Connected` re-runs the subscribe sequence for an
    /// identity that is attaching with no attempt in flight, and also for an
    /// attached one: status is observed through a watch, so an outage may be
    /// seen only as a new `Connected`. Resubscribing a live channel is
    /// answered by the transport at once.
    ///
    /// # Errors
    ///
    /// Returns the transport error of a failed resubscribe.
    pub async fn handle_status(&self, status: TransportStatus) -> Result<(), TransportError> {
        match status {
            TransportStatus::Unavailable => {
                let mut inner = self.lock();
                if let ChannelState::Attached {
                    user_id,
                    generation,
                } = inner.state
                {
                    log::info!("[Channel] Transport unavailable, user {user_id} waiting to reattach");
                    self.release(user_id);
                    inner.state = ChannelState::Attaching {
                        user_id,
                        generation,
                        in_flight: false,
                    };
                }
                Ok(())
            }
            TransportStatus::Connected => {
                let attempt = {
                    let mut inner = self.lock();
                    match inner.state {
                        ChannelState::Attaching {
                            user_id,
                            in_flight: false,
                            ..
                        }
                        | ChannelState::Attached { user_id, .. } => {
                            let generation = inner.next_generation();
                            inner.state = ChannelState::Attaching {
                                user_id,
                                generation,
                                in_flight: true,
                            };
                            Some((user_id, generation))
                        }
                        _ => None,
                    }
                };
                match attempt {
                    Some((user_id, generation)) => {
                        log::info!("[Channel] Transport connected, reattaching user {user_id}");
                        self.run_attempt(user_id, generation).await
                    }
                    None => Ok(()),
                }
            }
            TransportStatus::Connecting => Ok(()),
        }
    }

    async fn run_attempt(&self, user_id: u64, generation: u64) -> Result<(), TransportError> {
        let channel = channel_name(user_id);
        log::debug!("[Channel] Subscribing to {channel} (generation {generation})");
        let result = self.transport.subscribe(&channel).await;

        let mut inner = self.lock();
        let current = matches!(
            inner.state,
            ChannelState::Attaching { generation: g, .. } if g == generation
        );
        if !current {
            // Superseded while in flight. Release the subscription unless a
            // newer state owns the same channel.
            if result.is_ok() && inner.state.user_id() != Some(user_id) {
                self.transport.leave(&channel);
            }
            log::debug!("[Channel] Discarding stale attempt for {channel}");
            return Ok(());
        }

        match result {
            Ok(()) => {
                for kind in EventKind::ALL {
                    self.transport
                        .listen(&channel, kind.wire_event(), self.listener(kind, &channel));
                }
                inner.state = ChannelState::Attached {
                    user_id,
                    generation,
                };
                log::info!("[Channel] Attached to {channel}");
                Ok(())
            }
            Err(e) => {
                log::warn!("[Channel] Subscribe to {channel} failed: {e}");
                self.stop_listeners(user_id);
                inner.state = ChannelState::Attaching {
                    user_id,
                    generation,
                    in_flight: false,
                };
                Err(e)
            }
        }
    }

    fn listener(&self, kind: EventKind, channel: &str) -> EventListener {
        let bound = channel.to_string();
        let records = self.records.clone();
        Arc::new(move |frame_channel: &str, data: serde_json::Value| {
            if frame_channel != bound {
                log::debug!("[Channel] Ignoring {kind} for {frame_channel} on listener for {bound}");
                return;
            }
            match events::translate(kind, &data, Utc::now()) {
                Ok(record) => {
                    if records.send(record).is_err() {
                        log::debug!("[Channel] Record receiver gone, dropping {kind}");
                    }
                }
                Err(e) => log::warn!("[Channel] Dropping malformed {kind} event: {e}"),
            }
        })
    }

    fn teardown(&self, inner: &mut Inner) {
        match inner.state {
            ChannelState::Attached { user_id, .. } => {
                self.release(user_id);
                log::info!("[Channel] Detached user {user_id}");
            }
            // An in-flight attempt leaves on its own; listeners kept from an
            // earlier attachment go now.
            ChannelState::Attaching { user_id, .. } => {
                self.stop_listeners(user_id);
                log::debug!("[Channel] Abandoning attach for user {user_id}");
            }
            ChannelState::Detached => {}
        }
        inner.state = ChannelState::Detached;
    }

    /// Stops both listeners, then leaves.
    fn release(&self, user_id: u64) {
        self.stop_listeners(user_id);
        self.transport.leave(&channel_name(user_id));
    }

    fn stop_listeners(&self, user_id: u64) {
        let channel = channel_name(user_id);
        for kind in EventKind::ALL {
            self.transport.stop_listening(&channel, kind.wire_event());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
