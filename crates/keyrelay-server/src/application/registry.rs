//! The device registry: the authoritative set of target devices.
//!
//! Every device the relay knows about lives here, keyed by its [`DeviceId`],
//! together with its label, endpoint, connection state, and (while connected)
//! the open [`DeviceLink`].
//!
//! # Concurrency model (for beginners)
//!
//! The registry is shared by the front-end sessions, the fan-out coordinator,
//! and the background tasks that watch each connection.  The map itself sits
//! behind a short-lived `std::sync::Mutex`: it is only ever held to read or
//! update a slot, never across an `.await`.
//!
//! Each open link is wrapped in its own `tokio::sync::Mutex`.  The fan-out
//! coordinator holds that lock for the whole duration of one key or text
//! playback, so two commands aimed at the same device queue up in arrival
//! order (tokio's mutex is fair) instead of interleaving their keystrokes.
//!
//! # Generations
//!
//! Every connect attempt and every disconnect bumps the slot's generation.
//! Work that finishes late (a slow handshake, a watcher that sees the socket
//! close) only touches the slot if the generation it started with is still
//! current, so a stale result can never overwrite a newer state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use keyrelay_core::{ConnectionState, DeviceId, DeviceSummary};

use crate::application::link::{DeviceConnector, DeviceLink, LinkError};
use crate::application::outcome::{CommandOutcome, DispatchFailure};
use crate::domain::messages::BROADCAST_TARGET;

/// An open link shared between the registry and in-flight operations.
pub type SharedLink = Arc<tokio::sync::Mutex<Box<dyn DeviceLink>>>;

const EVENT_CAPACITY: usize = 64;

// ── Errors and events ─────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device '{0}' is already registered")]
    Duplicate(DeviceId),

    #[error("device '{0}' is not registered")]
    NotFound(DeviceId),

    #[error("device '{0}' is already connecting")]
    ConnectInProgress(DeviceId),

    #[error("device id '{0}' is reserved for broadcast commands")]
    ReservedId(DeviceId),

    #[error("device '{id}': {source}")]
    Link {
        id: DeviceId,
        #[source]
        source: LinkError,
    },
}

impl From<RegistryError> for DispatchFailure {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => DispatchFailure::NotFound(id),
            RegistryError::Link { source, .. } => DispatchFailure::Link(source),
            RegistryError::ConnectInProgress(id) => DispatchFailure::Connecting(id),
            err @ (RegistryError::Duplicate(_) | RegistryError::ReservedId(_)) => {
                DispatchFailure::Rejected(err.to_string())
            }
        }
    }
}

/// Change notifications.  Front-end sessions re-push the device list on each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(DeviceId),
    Removed(DeviceId),
    StateChanged {
        id: DeviceId,
        state: ConnectionState,
    },
}

/// Result of [`DeviceRegistry::connect_all`].
#[derive(Debug, Clone)]
pub struct ConnectReport {
    pub all_succeeded: bool,
    pub outcomes: Vec<CommandOutcome>,
}

impl ConnectReport {
    pub fn connected_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success()).count()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct DeviceSlot {
    label: String,
    endpoint: String,
    port: Option<u16>,
    state: ConnectionState,
    metadata: Option<String>,
    generation: u64,
    link: Option<SharedLink>,
}

impl DeviceSlot {
    fn summary(&self, id: &DeviceId) -> DeviceSummary {
        DeviceSummary {
            id: id.clone(),
            label: self.label.clone(),
            endpoint: self.endpoint.clone(),
            port: self.port,
            state: self.state,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Registration order, so listings and fan-out outcomes are stable.
    order: Vec<DeviceId>,
    slots: HashMap<DeviceId, DeviceSlot>,
    next_generation: u64,
}

impl RegistryInner {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

/// Mutable set of target devices and their connections.
pub struct DeviceRegistry {
    connector: Arc<dyn DeviceConnector>,
    inner: Mutex<RegistryInner>,
    events: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    pub fn new(connector: Arc<dyn DeviceConnector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connector,
            inner: Mutex::new(RegistryInner::default()),
            events,
        }
    }

    fn inner(&self) -> MutexGuard<'_, RegistryInner> {
        // A panic while holding the lock cannot leave a slot half-written, so
        // a poisoned lock is still safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Receives every subsequent [`RegistryEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Registers a device in the Disconnected state.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Duplicate`] if the id is already registered.  The
    /// existing entry is left untouched.  [`RegistryError::ReservedId`] for
    /// the broadcast target name, which could never be addressed alone.
    pub fn add(
        &self,
        id: impl Into<DeviceId>,
        label: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        let endpoint = endpoint.into();
        if id.as_str() == BROADCAST_TARGET {
            return Err(RegistryError::ReservedId(id));
        }
        let port = self.connector.endpoint_port(&endpoint);
        {
            let mut inner = self.inner();
            if inner.slots.contains_key(&id) {
                return Err(RegistryError::Duplicate(id));
            }
            let slot = DeviceSlot {
                label: label.into(),
                port,
                endpoint,
                state: ConnectionState::Disconnected,
                metadata: None,
                generation: 0,
                link: None,
            };
            inner.order.push(id.clone());
            inner.slots.insert(id.clone(), slot);
        }
        info!(device = %id, "device registered");
        self.emit(RegistryEvent::Added(id));
        Ok(())
    }

    /// Unregisters a device, closing its connection if one is open.
    ///
    /// The entry disappears from lookups immediately.  The connection is
    /// closed before this returns; an operation already running on it is
    /// allowed to finish first.
    pub async fn remove(&self, id: &str) -> Result<(), RegistryError> {
        let slot = {
            let mut inner = self.inner();
            let slot = inner
                .slots
                .remove(id)
                .ok_or_else(|| RegistryError::NotFound(DeviceId::new(id)))?;
            inner.order.retain(|existing| existing.as_str() != id);
            slot
        };
        if let Some(link) = slot.link {
            link.lock().await.close().await;
        }
        info!(device = %id, "device removed");
        self.emit(RegistryEvent::Removed(DeviceId::new(id)));
        Ok(())
    }

    /// Opens the connection for one device.
    ///
    /// Already-connected devices are left alone.  On success the device is
    /// Connected and its metadata recorded; on failure it is Disconnected and
    /// the error says why.
    pub async fn connect(
        self: &Arc<Self>,
        id: &str,
        timeout: Duration,
    ) -> Result<(), RegistryError> {
        let (id, endpoint, generation) = {
            let mut inner = self.inner();
            let generation = inner.bump();
            let key = DeviceId::new(id);
            let slot = inner
                .slots
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
            match slot.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => return Err(RegistryError::ConnectInProgress(key)),
                ConnectionState::Disconnected => {}
            }
            slot.state = ConnectionState::Connecting;
            slot.generation = generation;
            (key, slot.endpoint.clone(), generation)
        };
        self.emit(RegistryEvent::StateChanged {
            id: id.clone(),
            state: ConnectionState::Connecting,
        });
        debug!(device = %id, %endpoint, "connecting");

        let opened = self.connector.open(&endpoint, timeout).await;

        let mut link = match opened {
            Ok(link) => link,
            Err(source) => {
                warn!(device = %id, %endpoint, error = %source, "connect failed");
                self.transition_if_current(&id, generation, ConnectionState::Disconnected);
                return Err(RegistryError::Link { id, source });
            }
        };

        let closed = link.take_closed_signal();
        let metadata = link.metadata().map(str::to_owned);
        let shared: SharedLink = Arc::new(tokio::sync::Mutex::new(link));

        let adopted = {
            let mut inner = self.inner();
            match inner.slots.get_mut(&id) {
                Some(slot)
                    if slot.generation == generation
                        && slot.state == ConnectionState::Connecting =>
                {
                    slot.state = ConnectionState::Connected;
                    slot.metadata = metadata.clone();
                    slot.link = Some(Arc::clone(&shared));
                    Ok(())
                }
                Some(_) => Err(RegistryError::Link {
                    id: id.clone(),
                    source: LinkError::Disconnected,
                }),
                None => Err(RegistryError::NotFound(id.clone())),
            }
        };

        if let Err(err) = adopted {
            // Removed or disconnected while the handshake was in flight.
            debug!(device = %id, "discarding superseded connection");
            shared.lock().await.close().await;
            return Err(err);
        }

        info!(
            device = %id,
            %endpoint,
            metadata = metadata.as_deref().unwrap_or(""),
            "device connected"
        );
        self.emit(RegistryEvent::StateChanged {
            id: id.clone(),
            state: ConnectionState::Connected,
        });

        if let Some(closed) = closed {
            self.spawn_loss_watcher(id, generation, closed);
        }
        Ok(())
    }

    /// Connects every registered device concurrently.
    ///
    /// A slow or unreachable device never delays the others beyond its own
    /// timeout.  `all_succeeded` is true only if every device ended up
    /// connected.
    pub async fn connect_all(self: &Arc<Self>, timeout: Duration) -> ConnectReport {
        let ids: Vec<DeviceId> = self.inner().order.clone();
        let attempts = ids.into_iter().map(|id| async move {
            match self.connect(id.as_str(), timeout).await {
                Ok(()) => CommandOutcome::succeeded(id),
                Err(err) => CommandOutcome::failed(id, true, err.into()),
            }
        });
        let outcomes = join_all(attempts).await;
        let all_succeeded = outcomes.iter().all(CommandOutcome::success);
        ConnectReport {
            all_succeeded,
            outcomes,
        }
    }

    /// Closes one device's connection and marks it Disconnected.
    pub async fn disconnect(&self, id: &str) -> Result<(), RegistryError> {
        let (link, changed) = {
            let mut inner = self.inner();
            let generation = inner.bump();
            let slot = inner
                .slots
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(DeviceId::new(id)))?;
            let changed = slot.state != ConnectionState::Disconnected;
            slot.state = ConnectionState::Disconnected;
            slot.generation = generation;
            (slot.link.take(), changed)
        };
        if let Some(link) = link {
            link.lock().await.close().await;
        }
        if changed {
            info!(device = %id, "device disconnected");
            self.emit(RegistryEvent::StateChanged {
                id: DeviceId::new(id),
                state: ConnectionState::Disconnected,
            });
        }
        Ok(())
    }

    /// Closes every open connection.  Used on shutdown.
    pub async fn close_all(&self) {
        let ids: Vec<DeviceId> = self.inner().order.clone();
        let closes = ids.iter().map(|id| self.disconnect(id.as_str()));
        for result in join_all(closes).await {
            if let Err(err) = result {
                debug!(error = %err, "device vanished during shutdown");
            }
        }
    }

    /// Snapshot of every device in registration order.
    pub fn list(&self) -> std::vec::IntoIter<DeviceSummary> {
        let inner = self.inner();
        inner
            .order
            .iter()
            .filter_map(|id| inner.slots.get(id).map(|slot| slot.summary(id)))
            .collect::<Vec<_>>()
            .into_iter()
    }

    pub fn get(&self, id: &str) -> Option<DeviceSummary> {
        let inner = self.inner();
        inner
            .slots
            .get_key_value(id)
            .map(|(key, slot)| slot.summary(key))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner().slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Coordinator support ───────────────────────────────────────────────────

    /// The open link of one device, or why there is none.
    pub(crate) fn link_for(&self, id: &str) -> Result<(DeviceId, SharedLink), DispatchFailure> {
        let inner = self.inner();
        let (key, slot) = inner
            .slots
            .get_key_value(id)
            .ok_or_else(|| DispatchFailure::NotFound(DeviceId::new(id)))?;
        match (&slot.link, slot.state) {
            (Some(link), ConnectionState::Connected) => Ok((key.clone(), Arc::clone(link))),
            _ => Err(DispatchFailure::NotConnected(key.clone())),
        }
    }

    /// Every device in registration order with its link, if connected.
    pub(crate) fn targets(&self) -> Vec<(DeviceId, Option<SharedLink>)> {
        let inner = self.inner();
        inner
            .order
            .iter()
            .filter_map(|id| {
                inner.slots.get(id).map(|slot| {
                    let link = match slot.state {
                        ConnectionState::Connected => slot.link.clone(),
                        _ => None,
                    };
                    (id.clone(), link)
                })
            })
            .collect()
    }

    /// Marks a device Disconnected after `link` failed mid-operation.
    ///
    /// Ignored when the device has already moved on to a different link.
    pub(crate) async fn report_link_failure(&self, id: &DeviceId, link: &SharedLink) {
        let detached = {
            let mut inner = self.inner();
            let generation = inner.bump();
            match inner.slots.get_mut(id) {
                Some(slot) if slot.link.as_ref().is_some_and(|l| Arc::ptr_eq(l, link)) => {
                    slot.state = ConnectionState::Disconnected;
                    slot.generation = generation;
                    slot.link.take()
                }
                _ => None,
            }
        };
        if let Some(link) = detached {
            warn!(device = %id, "connection lost during send");
            self.emit(RegistryEvent::StateChanged {
                id: id.clone(),
                state: ConnectionState::Disconnected,
            });
            link.lock().await.close().await;
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn transition_if_current(&self, id: &DeviceId, generation: u64, state: ConnectionState) {
        let changed = {
            let mut inner = self.inner();
            match inner.slots.get_mut(id) {
                Some(slot) if slot.generation == generation && slot.state != state => {
                    slot.state = state;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(RegistryEvent::StateChanged {
                id: id.clone(),
                state,
            });
        }
    }

    fn spawn_loss_watcher(
        self: &Arc<Self>,
        id: DeviceId,
        generation: u64,
        closed: oneshot::Receiver<()>,
    ) {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            // Resolves with Ok or Err once the sender side is gone; both mean
            // the remote end closed.
            let _ = closed.await;
            if let Some(registry) = registry.upgrade() {
                registry.mark_lost(&id, generation).await;
            }
        });
    }

    async fn mark_lost(&self, id: &DeviceId, generation: u64) {
        let detached = {
            let mut inner = self.inner();
            match inner.slots.get_mut(id) {
                Some(slot)
                    if slot.generation == generation
                        && slot.state == ConnectionState::Connected =>
                {
                    slot.state = ConnectionState::Disconnected;
                    slot.link.take()
                }
                _ => None,
            }
        };
        if let Some(link) = detached {
            warn!(device = %id, "device closed the connection");
            self.emit(RegistryEvent::StateChanged {
                id: id.clone(),
                state: ConnectionState::Disconnected,
            });
            link.lock().await.close().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
