use crate::model::TrackRef;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Ordered, keyed track list curated by the user.
#[derive(Debug)]
pub struct Playlist {
    entries: Vec<TrackRef>,
    lookup: HashMap<String, usize>,
    selected: Option<usize>,
    shuffle_order: Vec<usize>,
    shuffle_rng: SmallRng,
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

impl Playlist {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_rng(&mut rand::rng()))
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(shuffle_rng: SmallRng) -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
            selected: None,
            shuffle_order: Vec::new(),
            shuffle_rng,
        }
    }

    /// Appends `track` unless its key is already listed. Returns whether the
    /// playlist changed.
    pub fn add_media(&mut self, track: TrackRef) -> bool {
        if self.lookup.contains_key(track.key()) {
            return false;
        }

        self.lookup.insert(track.key().to_string(), self.entries.len());
        self.entries.push(track);
        if self.selected.is_none() {
            self.selected = Some(0);
        }
        self.rebuild_shuffle_order(None);
        true
    }

    pub fn remove_media(&mut self, key: &str) -> Option<TrackRef> {
        let index = self.lookup.remove(key)?;
        let removed = self.entries.remove(index);
        self.lookup = build_lookup(&self.entries);

        self.selected = match self.selected {
            _ if self.entries.is_empty() => None,
            Some(selected) if selected > index => Some(selected - 1),
            Some(selected) if selected < self.entries.len() => Some(selected),
            _ => Some(0),
        };
        self.rebuild_shuffle_order(None);
        Some(removed)
    }

    pub fn get(&self, key: &str) -> Option<&TrackRef> {
        self.position(key).and_then(|idx| self.entries.get(idx))
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    pub fn entry(&self, index: usize) -> Option<&TrackRef> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRef> {
        self.entries.iter()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        if index < self.entries.len() {
            self.selected = Some(index);
        }
    }

    /// Index reached by stepping once from `current` in insertion order.
    /// A missing or stale `current` resolves to the first entry when
    /// wrapping, and to nothing otherwise.
    pub fn sequential_step(
        &self,
        current: Option<&str>,
        direction: Direction,
        wrap: bool,
    ) -> Option<usize> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }

        let Some(index) = current.and_then(|key| self.position(key)) else {
            return wrap.then_some(0);
        };

        let stepped = match direction {
            Direction::Forward => index.checked_add(1).filter(|next| *next < len),
            Direction::Backward => index.checked_sub(1),
        };

        match stepped {
            Some(next) => Some(next),
            None if wrap => Some(match direction {
                Direction::Forward => 0,
                Direction::Backward => len - 1,
            }),
            None => None,
        }
    }

    /// Same contract as [`Playlist::sequential_step`], walking the shuffled
    /// permutation instead. Wrapping forward draws a fresh permutation that
    /// does not start on the track that just played.
    pub fn shuffled_step(
        &mut self,
        current: Option<&str>,
        direction: Direction,
        wrap: bool,
    ) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        if self.shuffle_order.len() != self.entries.len() {
            self.rebuild_shuffle_order(None);
        }

        let current_index = current.and_then(|key| self.position(key));
        let Some(cursor) =
            current_index.and_then(|idx| self.shuffle_order.iter().position(|entry| *entry == idx))
        else {
            return wrap.then(|| self.shuffle_order[0]);
        };

        match direction {
            Direction::Forward => {
                if let Some(next) = self.shuffle_order.get(cursor + 1) {
                    return Some(*next);
                }
                if !wrap {
                    return None;
                }
                self.rebuild_shuffle_order(current_index);
                self.shuffle_order
                    .get(1)
                    .or_else(|| self.shuffle_order.first())
                    .copied()
            }
            Direction::Backward => match cursor.checked_sub(1) {
                Some(prev) => Some(self.shuffle_order[prev]),
                None => wrap.then(|| self.shuffle_order[self.shuffle_order.len() - 1]),
            },
        }
    }

    /// Draws a new permutation. When `anchor` is given it is moved to the
    /// front so every other entry plays before it repeats.
    pub fn rebuild_shuffle_order(&mut self, anchor: Option<usize>) {
        self.shuffle_order = (0..self.entries.len()).collect();
        self.shuffle_order.shuffle(&mut self.shuffle_rng);
        if let Some(pos) = anchor.and_then(|idx| self.shuffle_order.iter().position(|e| *e == idx)) {
            self.shuffle_order.swap(0, pos);
        }
    }

    pub fn shuffle_order(&self) -> &[usize] {
        &self.shuffle_order
    }
}

fn build_lookup(entries: &[TrackRef]) -> HashMap<String, usize> {
    let mut map = HashMap::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        map.insert(entry.key().to_string(), idx);
    }
    map
}
