//! The set of connected front-end sessions.
//!
//! Each session owns an outbound queue drained by its socket writer task.
//! Replies to a session's own commands are queued with backpressure;
//! device-list pushes to everyone use `try_send` and are dropped for a
//! session whose queue is full, since the next push supersedes them anyway.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::commands::CommandHandler;
use crate::domain::messages::ServerMessage;

/// Outbound queue depth per session.
pub const SESSION_QUEUE: usize = 64;

/// Handle returned by [`SessionHub::register`].
pub struct SessionChannel {
    pub id: Uuid,
    pub outbound: mpsc::Sender<ServerMessage>,
    pub inbox: mpsc::Receiver<ServerMessage>,
}

#[derive(Default)]
pub struct SessionHub {
    sessions: Mutex<HashMap<Uuid, mpsc::Sender<ServerMessage>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, mpsc::Sender<ServerMessage>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self) -> SessionChannel {
        let (tx, rx) = mpsc::channel(SESSION_QUEUE);
        let id = Uuid::new_v4();
        self.sessions().insert(id, tx.clone());
        debug!(session = %id, "session registered");
        SessionChannel {
            id,
            outbound: tx,
            inbox: rx,
        }
    }

    pub fn unregister(&self, id: Uuid) -> bool {
        let removed = self.sessions().remove(&id).is_some();
        if removed {
            debug!(session = %id, "session unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues `message` for every session.  Returns how many accepted it.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        self.sessions().retain(|id, tx| match tx.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = %id, "session queue full, push dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        delivered
    }
}

/// Pushes the device list to every session whenever the registry changes.
///
/// Runs until the registry's event channel closes.
pub async fn push_device_list_on_change(handler: CommandHandler, hub: Arc<SessionHub>) {
    let mut events = handler.fanout().registry().subscribe();
    loop {
        match events.recv().await {
            Ok(event) => debug!(?event, "registry changed"),
            Err(RecvError::Lagged(missed)) => debug!(missed, "registry events lagged"),
            Err(RecvError::Closed) => break,
        }
        hub.broadcast(&handler.device_list());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
