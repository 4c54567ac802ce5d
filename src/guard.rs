//! Session load guard - at most one reconciliation per `(container, game)`
//! per app session.
//!
//! The guard flips a key to `Loaded` at the moment it grants a load, before
//! any remote call is awaited, so a second trigger arriving while the first is
//! in flight is refused. Each grant carries a generation stamp; resetting or
//! force-refreshing a key bumps it, which marks older in-flight results stale.
//!
//! The guard also counts ledger writes per ledger scope. A reconciliation
//! takes a mark before it fetches and may only apply its result if no write
//! for that scope started or finished in between.

use std::collections::HashMap;

use crate::card::Game;

/// Identity of one reconciliation target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadKey {
    pub container_id: String,
    pub game: Game,
}

impl LoadKey {
    pub fn new(container_id: impl Into<String>, game: Game) -> Self {
        Self {
            container_id: container_id.into(),
            game,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    NotLoaded,
    Loaded,
}

/// Proof that a load was granted for `key` at a given generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    key: LoadKey,
    generation: u64,
}

impl LoadTicket {
    pub fn key(&self) -> &LoadKey {
        &self.key
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: LoadState,
    generation: u64,
}

#[derive(Debug, Default)]
struct Writes {
    pending: usize,
    version: u64,
}

/// Never persisted; a new app session starts with every key `NotLoaded`.
#[derive(Debug, Default)]
pub struct SessionLoadGuard {
    slots: HashMap<LoadKey, Slot>,
    writes: HashMap<LoadKey, Writes>,
    generations: u64,
}

impl SessionLoadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&mut self) -> u64 {
        self.generations += 1;
        self.generations
    }

    pub fn state(&self, key: &LoadKey) -> LoadState {
        self.slots.get(key).map(|s| s.state).unwrap_or_default()
    }

    /// Grant a load when `key` is not loaded or `force_refresh` is set. A grant
    /// marks the key `Loaded` immediately.
    pub fn should_load(&mut self, key: &LoadKey, force_refresh: bool) -> Option<LoadTicket> {
        if self.state(key) == LoadState::Loaded && !force_refresh {
            return None;
        }
        let generation = self.next_generation();
        let slot = self.slots.entry(key.clone()).or_default();
        slot.state = LoadState::Loaded;
        slot.generation = generation;
        Some(LoadTicket {
            key: key.clone(),
            generation,
        })
    }

    /// Whether a result produced under `ticket` may still be applied.
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.slots
            .get(&ticket.key)
            .map(|s| s.state == LoadState::Loaded && s.generation == ticket.generation)
            .unwrap_or(false)
    }

    /// Undo a grant whose load failed, so the next trigger tries again.
    /// No effect if the key has moved on since.
    pub fn release(&mut self, ticket: &LoadTicket) {
        if self.is_current(ticket) {
            self.reset(&ticket.key);
        }
    }

    pub fn reset(&mut self, key: &LoadKey) {
        let generation = self.next_generation();
        if let Some(slot) = self.slots.get_mut(key) {
            slot.state = LoadState::NotLoaded;
            slot.generation = generation;
        }
    }

    /// Reset every game for one container (container switch).
    pub fn reset_container(&mut self, container_id: &str) {
        self.reset_where(|key| key.container_id == container_id);
    }

    /// Reset every container for one game (game switch).
    pub fn reset_game(&mut self, game: Game) {
        self.reset_where(|key| key.game == game);
    }

    pub fn reset_all(&mut self) {
        self.reset_where(|_| true);
    }

    /// A ledger write for `scope` has been issued.
    pub fn begin_write(&mut self, scope: &LoadKey) {
        self.writes.entry(scope.clone()).or_default().pending += 1;
    }

    /// A ledger write for `scope` has settled, successfully or not.
    pub fn end_write(&mut self, scope: &LoadKey) {
        if let Some(writes) = self.writes.get_mut(scope) {
            writes.pending = writes.pending.saturating_sub(1);
            writes.version += 1;
        }
    }

    pub fn write_mark(&self, scope: &LoadKey) -> u64 {
        self.writes.get(scope).map(|w| w.version).unwrap_or(0)
    }

    /// Whether a write for `scope` is in flight or has settled since `mark`.
    pub fn written_since(&self, scope: &LoadKey, mark: u64) -> bool {
        self.writes
            .get(scope)
            .is_some_and(|w| w.pending > 0 || w.version != mark)
    }

    fn reset_where(&mut self, predicate: impl Fn(&LoadKey) -> bool) {
        let keys: Vec<LoadKey> = self.slots.keys().filter(|k| predicate(*k)).cloned().collect();
        for key in keys {
            self.reset(&key);
        }
    }
}
