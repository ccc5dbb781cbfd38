//! Queue store: ordered tracks, the active index and the metadata cache.
//!
//! Indices are positional. Every mutation renumbers the active index and the
//! metadata-loaded cache in lockstep, so the active index is always either
//! `None` or a valid position.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    audio::track::{Track, TrackMetadataPatch},
    error::{PlayerError, PlayerResult},
};

/// What `insert` did to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Position of the first inserted track.
    pub at: usize,
    pub count: usize,
    /// The queue was empty with nothing active before the insertion.
    pub into_empty: bool,
}

/// What `remove` did to the active track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveAfterRemoval {
    /// The active track survived, possibly at a new index.
    Kept,
    /// The active track was removed; the active index now points at the
    /// track that took its place.
    Replaced { removed: usize },
    /// The active track was removed and the queue is empty.
    Emptied { removed: usize },
}

/// Ordered track list with a cursor.
#[derive(Debug, Default)]
pub struct QueueStore {
    tracks: Vec<Track>,
    active: Option<usize>,
    metadata_loaded: BTreeMap<usize, bool>,
}

impl QueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Copy of every track, in order.
    #[must_use]
    pub fn tracks(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Index of the active track.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    #[must_use]
    pub fn active_track(&self) -> Option<&Track> {
        self.active.and_then(|index| self.tracks.get(index))
    }

    /// Makes `index` active.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for an invalid index.
    pub fn set_active(&mut self, index: Option<usize>) -> PlayerResult<()> {
        if let Some(index) = index {
            self.check_index(index)?;
        }
        self.active = index;
        Ok(())
    }

    /// Inserts `tracks` before `before`, or appends when `before` is `None`.
    ///
    /// `before` is clamped to the queue length. An active index at or after
    /// the insertion point moves forward by the inserted count.
    pub fn insert(&mut self, tracks: Vec<Track>, before: Option<usize>) -> Insertion {
        let len = self.tracks.len();
        let at = before.map_or(len, |index| index.min(len));
        let count = tracks.len();
        let into_empty = len == 0 && self.active.is_none();

        if count == 0 {
            return Insertion {
                at,
                count,
                into_empty: false,
            };
        }

        self.tracks.splice(at..at, tracks);

        if let Some(active) = self.active
            && at <= active
        {
            self.active = Some(active + count);
        }
        self.metadata_loaded = std::mem::take(&mut self.metadata_loaded)
            .into_iter()
            .map(|(index, loaded)| {
                if index >= at {
                    (index + count, loaded)
                } else {
                    (index, loaded)
                }
            })
            .collect();

        debug!("Queue: Inserted {count} tracks at {at}, length now {}", self.len());
        Insertion {
            at,
            count,
            into_empty,
        }
    }

    /// Moves the track at `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` if either index is invalid.
    pub fn move_track(&mut self, from: usize, to: usize) -> PlayerResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }

        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        self.active = self.active.map(|active| relocate(active, from, to));
        self.metadata_loaded = std::mem::take(&mut self.metadata_loaded)
            .into_iter()
            .map(|(index, loaded)| (relocate(index, from, to), loaded))
            .collect();

        debug!("Queue: Moved track {from} to {to}");
        Ok(())
    }

    /// Removes the tracks at `indices`.
    ///
    /// All indices are validated first; duplicates are ignored. Removal runs
    /// from the highest index down so earlier removals don't shift later ones.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` without removing anything if
    /// any index is invalid.
    pub fn remove(&mut self, indices: &[usize]) -> PlayerResult<ActiveAfterRemoval> {
        for &index in indices {
            self.check_index(index)?;
        }
        let mut ordered = indices.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        ordered.dedup();

        let original_active = self.active;
        let mut active_removed = false;

        for index in ordered {
            self.tracks.remove(index);
            self.metadata_loaded = std::mem::take(&mut self.metadata_loaded)
                .into_iter()
                .filter(|(cached, _)| *cached != index)
                .map(|(cached, loaded)| {
                    if cached > index {
                        (cached - 1, loaded)
                    } else {
                        (cached, loaded)
                    }
                })
                .collect();

            match self.active {
                Some(active) if index < active => self.active = Some(active - 1),
                Some(active) if index == active => active_removed = true,
                _ => {}
            }
        }

        debug!("Queue: Removed {} tracks, length now {}", indices.len(), self.len());

        let Some(removed) = original_active.filter(|_| active_removed) else {
            return Ok(ActiveAfterRemoval::Kept);
        };
        if self.tracks.is_empty() {
            self.active = None;
            return Ok(ActiveAfterRemoval::Emptied { removed });
        }
        if let Some(active) = self.active
            && active >= self.tracks.len()
        {
            self.active = Some(self.tracks.len() - 1);
        }
        Ok(ActiveAfterRemoval::Replaced { removed })
    }

    /// Merges `patch` into the track at `index`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::IndexOutOfBounds` for an invalid index.
    pub fn update_metadata(&mut self, index: usize, patch: TrackMetadataPatch) -> PlayerResult<()> {
        self.check_index(index)?;
        self.tracks[index].apply(patch);
        Ok(())
    }

    #[must_use]
    pub fn is_metadata_loaded(&self, index: usize) -> bool {
        self.metadata_loaded.get(&index).copied().unwrap_or(false)
    }

    pub fn mark_metadata_loaded(&mut self, index: usize) {
        if index < self.tracks.len() {
            self.metadata_loaded.insert(index, true);
        }
    }

    /// Empties the queue, the cursor and the cache.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.active = None;
        self.metadata_loaded.clear();
    }

    fn check_index(&self, index: usize) -> PlayerResult<()> {
        if index < self.tracks.len() {
            Ok(())
        } else {
            Err(PlayerError::IndexOutOfBounds {
                index,
                len: self.tracks.len(),
            })
        }
    }
}

/// New position of `index` after the entry at `from` moves to `to`.
fn relocate(index: usize, from: usize, to: usize) -> usize {
    if index == from {
        to
    } else if from < index && index <= to {
        index - 1
    } else if to <= index && index < from {
        index + 1
    } else {
        index
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::queue::relocate;

    #[test]
    fn test_relocate_interval_shift() {
        // Moving forward past the index pulls it back.
        assert_eq!(relocate(2, 0, 3), 1);
        // Moving backward past the index pushes it forward.
        assert_eq!(relocate(1, 3, 0), 2);
        // The moved entry lands on the target.
        assert_eq!(relocate(3, 3, 0), 0);
        // Entries outside the interval stay put.
        assert_eq!(relocate(4, 0, 2), 4);
        assert_eq!(relocate(0, 2, 4), 0);
    }
}
