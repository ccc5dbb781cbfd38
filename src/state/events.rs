//! Player event publication.
//!
//! Listeners registered with `add_event_listener` run synchronously, in
//! registration order, on the same turn as the change that produced the
//! event. Channel subscribers receive the same events asynchronously.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering::Relaxed},
};

use {
    async_channel::{Receiver, Sender, unbounded},
    parking_lot::Mutex,
    serde::{Deserialize, Serialize},
    tracing::{trace, warn},
};

use crate::{audio::media::MediaErrorCode, state::transport::PlaybackState};

/// Kinds of events a listener can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PlaybackState,
    PlaybackTrackChanged,
    PlaybackProgressUpdated,
    PlaybackError,
}

/// Events published by the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// The playback state changed.
    PlaybackState { state: PlaybackState },
    /// The active track changed.
    PlaybackTrackChanged {
        prev_track: Option<usize>,
        next_track: Option<usize>,
    },
    /// Periodic or seek-triggered progress sample, in seconds.
    PlaybackProgressUpdated {
        position: f64,
        duration: f64,
        buffered: f64,
        track: Option<usize>,
    },
    /// The media element failed, or a play request was rejected.
    PlaybackError {
        code: MediaErrorCode,
        message: String,
    },
}

impl PlayerEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::PlaybackState { .. } => EventKind::PlaybackState,
            PlayerEvent::PlaybackTrackChanged { .. } => EventKind::PlaybackTrackChanged,
            PlayerEvent::PlaybackProgressUpdated { .. } => EventKind::PlaybackProgressUpdated,
            PlayerEvent::PlaybackError { .. } => EventKind::PlaybackError,
        }
    }
}

/// Handle returned by `add_event_listener`, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    handler: Handler,
}

/// Event registry shared between the engine and its sampler task.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Listener>>,
    subscribers: Mutex<Vec<Sender<PlayerEvent>>>,
    next_id: AtomicU64,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind`.
    pub fn add_event_listener<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Relaxed));
        self.listeners.lock().push(Listener {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a listener.
    ///
    /// # Returns
    ///
    /// `true` if the listener was registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    /// Subscribes to every event through a channel.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers `event` to matching listeners, then to channel subscribers.
    pub fn publish(&self, event: PlayerEvent) {
        let kind = event.kind();
        trace!(?kind, "Publishing player event");

        // Snapshot so handlers may register or remove listeners.
        let handlers: Vec<Handler> = self
            .listeners
            .lock()
            .iter()
            .filter(|listener| listener.kind == kind)
            .map(|listener| Arc::clone(&listener.handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }

        self.subscribers.lock().retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(e) if e.is_closed() => false,
            Err(e) => {
                warn!("EventBus: Failed to forward event to subscriber: {e}");
                true
            }
        });
    }
}
