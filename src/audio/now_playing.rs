//! System "now playing" integration.
//!
//! The integration shows the active track's metadata outside the host UI
//! and forwards hardware or OS transport buttons back as `RemoteCommand`s.

use {async_channel::Sender, tracing::info};

use crate::{audio::track::Track, state::PlaybackState};

/// Transport button pressed outside the host UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    /// Seek to a position in seconds.
    SeekTo(f64),
}

/// A system-level "now playing" surface.
pub trait NowPlaying: Send {
    /// Hands over the channel for transport button presses.
    fn attach(&mut self, commands: Sender<RemoteCommand>);

    /// Stops forwarding button presses.
    fn detach(&mut self);

    /// Shows `track` as the current item.
    fn set_metadata(&mut self, track: &Track);

    fn set_playback_state(&mut self, state: PlaybackState);

    /// Removes the current item.
    fn clear(&mut self);
}

/// Integration that only logs what it would display.
#[derive(Debug, Default)]
pub struct TracingNowPlaying {
    commands: Option<Sender<RemoteCommand>>,
}

impl TracingNowPlaying {
    /// Forwards a button press, as an OS media key would.
    ///
    /// # Returns
    ///
    /// `false` if the integration is detached.
    pub fn press(&self, command: RemoteCommand) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|tx| tx.try_send(command).is_ok())
    }
}

impl NowPlaying for TracingNowPlaying {
    fn attach(&mut self, commands: Sender<RemoteCommand>) {
        self.commands = Some(commands);
    }

    fn detach(&mut self) {
        self.commands = None;
    }

    fn set_metadata(&mut self, track: &Track) {
        info!(
            title = %track.title,
            artist = track.artist.as_deref().unwrap_or("Unknown artist"),
            album = track.album.as_deref().unwrap_or(""),
            "Now playing"
        );
    }

    fn set_playback_state(&mut self, state: PlaybackState) {
        info!(?state, "Now playing state");
    }

    fn clear(&mut self) {
        info!("Now playing cleared");
    }
}

#[cfg(test)]
mod tests {
    use async_channel::unbounded;

    use crate::audio::now_playing::{NowPlaying, RemoteCommand, TracingNowPlaying};

    #[test]
    fn test_press_forwards_while_attached() {
        let mut now_playing = TracingNowPlaying::default();
        assert!(!now_playing.press(RemoteCommand::Play));

        let (tx, rx) = unbounded();
        now_playing.attach(tx);
        assert!(now_playing.press(RemoteCommand::SeekTo(12.0)));
        assert_eq!(rx.try_recv().unwrap(), RemoteCommand::SeekTo(12.0));

        now_playing.detach();
        assert!(!now_playing.press(RemoteCommand::Next));
    }
}
