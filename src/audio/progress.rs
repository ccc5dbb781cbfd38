//! Periodic progress sampling.
//!
//! The sampler runs as its own tokio task, independent of transport
//! operations. It reads the media element through a shared handle and only
//! publishes while a track is active and playing.

use std::{sync::Arc, time::Duration};

use {
    async_channel::{Sender, unbounded},
    serde::{Deserialize, Serialize},
    tokio::{
        runtime::Handle,
        select,
        sync::watch::Receiver as WatchReceiver,
        time::{MissedTickBehavior, interval},
    },
    tracing::{debug, warn},
};

use crate::{
    audio::media::MediaBackend,
    state::{EventBus, PlayerEvent},
};

/// Position, duration and buffered end, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub position: f64,
    /// Zero while unknown.
    pub duration: f64,
    pub buffered: f64,
}

impl Progress {
    /// Samples the media element.
    #[must_use]
    pub fn sample(media: &dyn MediaBackend) -> Self {
        Self {
            position: media.position(),
            duration: media.duration().unwrap_or(0.0),
            buffered: media.buffered(),
        }
    }

    /// The progress event for `track`.
    #[must_use]
    pub fn into_event(self, track: Option<usize>) -> PlayerEvent {
        PlayerEvent::PlaybackProgressUpdated {
            position: self.position,
            duration: self.duration,
            buffered: self.buffered,
            track,
        }
    }
}

/// What the sampler needs to know about the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerView {
    pub track: Option<usize>,
    pub playing: bool,
}

/// Handle to the running sampler task.
#[derive(Default)]
pub struct ProgressSampler {
    shutdown_tx: Option<Sender<()>>,
}

impl ProgressSampler {
    /// Spawns the sampling loop on the current tokio runtime.
    ///
    /// Without a runtime the sampler stays stopped and progress is only
    /// published on seeks.
    #[must_use]
    pub fn start(
        period: Duration,
        media: Arc<dyn MediaBackend>,
        bus: Arc<EventBus>,
        view: WatchReceiver<SamplerView>,
    ) -> Self {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available, progress sampling disabled");
            return Self::default();
        };

        let (shutdown_tx, shutdown_rx) = unbounded::<()>();
        runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                select! {
                    _ = ticker.tick() => {
                        let current = *view.borrow();
                        if current.playing && current.track.is_some() {
                            bus.publish(Progress::sample(media.as_ref()).into_event(current.track));
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Progress sampler received shutdown signal");
                        break;
                    }
                }
            }
        });

        debug!("Progress sampler started with period {:?}", period);
        Self {
            shutdown_tx: Some(shutdown_tx),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Stops the sampling loop.
    pub fn stop(&mut self) {
        // Closing the channel wakes the loop.
        self.shutdown_tx.take();
    }
}

impl Drop for ProgressSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
