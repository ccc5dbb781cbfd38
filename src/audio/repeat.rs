//! Repeat resolution: where to go when a track ends or a skip is requested.

use crate::{
    error::{PlayerError, PlayerResult},
    state::RepeatMode,
};

/// Direction of a skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Why the next index is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The active track played to its end.
    TrackEnded,
    /// `skip_to_next` or `skip_to_previous`.
    Skip(Direction),
}

/// Outcome of repeat resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Reload the same index from the start.
    Replay { index: usize },
    /// Make `index` active. `wrapped` marks a jump across the queue boundary.
    Advance { index: usize, wrapped: bool },
    /// The queue finished: stop, keeping the active index.
    EndOfQueue,
}

/// Resolves the next active index.
///
/// `active` must be a valid index into a queue of `len` tracks.
///
/// # Errors
///
/// Returns `PlayerError::NoAdjacentTrack` for a skip past either end of the
/// queue with repeat off. A single-track queue is no exception.
pub fn resolve(
    mode: RepeatMode,
    trigger: Trigger,
    active: usize,
    len: usize,
) -> PlayerResult<Resolution> {
    let at_end = active + 1 >= len;
    let at_start = active == 0;

    match (mode, trigger) {
        (RepeatMode::Track, _) => Ok(Resolution::Replay { index: active }),

        (_, Trigger::TrackEnded | Trigger::Skip(Direction::Next)) if !at_end => {
            Ok(Resolution::Advance {
                index: active + 1,
                wrapped: false,
            })
        }
        (_, Trigger::Skip(Direction::Previous)) if !at_start => Ok(Resolution::Advance {
            index: active - 1,
            wrapped: false,
        }),

        (RepeatMode::Queue, Trigger::TrackEnded | Trigger::Skip(Direction::Next)) => {
            Ok(Resolution::Advance {
                index: 0,
                wrapped: true,
            })
        }
        (RepeatMode::Queue, Trigger::Skip(Direction::Previous)) => Ok(Resolution::Advance {
            index: len.saturating_sub(1),
            wrapped: true,
        }),

        (RepeatMode::Off, Trigger::TrackEnded) => Ok(Resolution::EndOfQueue),
        (RepeatMode::Off, Trigger::Skip(_)) => Err(PlayerError::NoAdjacentTrack),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audio::repeat::{Direction, Resolution, Trigger, resolve},
        error::PlayerError,
        state::RepeatMode,
    };

    const NEXT: Trigger = Trigger::Skip(Direction::Next);
    const PREVIOUS: Trigger = Trigger::Skip(Direction::Previous);

    #[test]
    fn test_track_mode_always_replays() {
        for trigger in [Trigger::TrackEnded, NEXT, PREVIOUS] {
            assert_eq!(
                resolve(RepeatMode::Track, trigger, 1, 3).unwrap(),
                Resolution::Replay { index: 1 }
            );
        }
    }

    #[test]
    fn test_off_mode_moves_within_queue() {
        assert_eq!(
            resolve(RepeatMode::Off, NEXT, 0, 3).unwrap(),
            Resolution::Advance {
                index: 1,
                wrapped: false
            }
        );
        assert_eq!(
            resolve(RepeatMode::Off, PREVIOUS, 2, 3).unwrap(),
            Resolution::Advance {
                index: 1,
                wrapped: false
            }
        );
        assert_eq!(
            resolve(RepeatMode::Off, Trigger::TrackEnded, 1, 3).unwrap(),
            Resolution::Advance {
                index: 2,
                wrapped: false
            }
        );
    }

    #[test]
    fn test_off_mode_at_boundaries() {
        assert!(matches!(
            resolve(RepeatMode::Off, NEXT, 2, 3),
            Err(PlayerError::NoAdjacentTrack)
        ));
        assert!(matches!(
            resolve(RepeatMode::Off, PREVIOUS, 0, 3),
            Err(PlayerError::NoAdjacentTrack)
        ));
        assert!(matches!(
            resolve(RepeatMode::Off, NEXT, 0, 1),
            Err(PlayerError::NoAdjacentTrack)
        ));
        assert_eq!(
            resolve(RepeatMode::Off, Trigger::TrackEnded, 2, 3).unwrap(),
            Resolution::EndOfQueue
        );
    }

    #[test]
    fn test_queue_mode_wraps() {
        assert_eq!(
            resolve(RepeatMode::Queue, NEXT, 2, 3).unwrap(),
            Resolution::Advance {
                index: 0,
                wrapped: true
            }
        );
        assert_eq!(
            resolve(RepeatMode::Queue, PREVIOUS, 0, 3).unwrap(),
            Resolution::Advance {
                index: 2,
                wrapped: true
            }
        );
        assert_eq!(
            resolve(RepeatMode::Queue, Trigger::TrackEnded, 2, 3).unwrap(),
            Resolution::Advance {
                index: 0,
                wrapped: true
            }
        );
    }

    #[test]
    fn test_queue_mode_single_track_restarts() {
        for trigger in [Trigger::TrackEnded, NEXT, PREVIOUS] {
            assert_eq!(
                resolve(RepeatMode::Queue, trigger, 0, 1).unwrap(),
                Resolution::Advance {
                    index: 0,
                    wrapped: true
                }
            );
        }
    }
}
