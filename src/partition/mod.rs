//! Binder partitions - the complete state of one binder, persisted per container.
//!
//! A partition owns the binder's working set (grouped into sub-collections),
//! page cursors, display name, selected game and a detail cache. Only
//! manually placed entries are written to durable storage; ledger-sourced
//! entries are re-derived from the ledger on every app session.

mod file;
mod kv;
mod store;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::card::{CanonicalCard, Game};
use crate::error::{Result, SyncError};
use crate::working_set::{EntrySource, WorkingSetEntry};

pub use file::FileKeyValueStore;
pub use kv::{InMemoryKeyValueStore, KeyValueStore};
pub use store::{PartitionChanged, PartitionStore};

/// A named group of entries within a binder ("set").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCollection {
    pub id: String,
    pub name: String,
    pub entries: Vec<WorkingSetEntry>,
}

impl SubCollection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerPartition {
    pub container_id: String,
    pub display_name: String,
    pub selected_game: Game,
    pub sub_collections: Vec<SubCollection>,
    pub current_sub_collection_id: Option<String>,
    pub page_cursor_by_sub_collection: BTreeMap<String, usize>,
    /// instance id -> card details.
    pub detail_cache: HashMap<String, CanonicalCard>,
    /// Bumped on every save.
    pub revision: u64,
}

impl ContainerPartition {
    /// Fresh partition seeded with the game's template sets.
    pub fn create_default(container_id: impl Into<String>, game: Game) -> Self {
        let sub_collections: Vec<SubCollection> = game
            .template_sets()
            .iter()
            .map(|(id, name)| SubCollection::new(*id, *name))
            .collect();
        Self {
            container_id: container_id.into(),
            display_name: format!("{} Binder", game.title()),
            selected_game: game,
            current_sub_collection_id: sub_collections.first().map(|s| s.id.clone()),
            page_cursor_by_sub_collection: sub_collections.iter().map(|s| (s.id.clone(), 0)).collect(),
            sub_collections,
            detail_cache: HashMap::new(),
            revision: 0,
        }
    }

    /// Id of the sub-collection ledger copies land in. Created if the
    /// partition has none.
    pub fn primary_sub_collection_id(&mut self) -> String {
        if self.sub_collections.is_empty() {
            self.sub_collections
                .push(SubCollection::new("collection", "My Collection"));
        }
        self.sub_collections[0].id.clone()
    }

    pub fn sub_collection(&self, id: &str) -> Option<&SubCollection> {
        self.sub_collections.iter().find(|s| s.id == id)
    }

    /// Entries across every sub-collection, in sub-collection then insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &WorkingSetEntry> {
        self.sub_collections.iter().flat_map(|s| s.entries.iter())
    }

    pub fn entry_count(&self) -> usize {
        self.sub_collections.iter().map(|s| s.entries.len()).sum()
    }

    pub fn find(&self, instance_id: &str) -> Option<&WorkingSetEntry> {
        self.entries().find(|e| e.instance_id == instance_id)
    }

    /// Append entries to their sub-collections (creating unknown ones) and
    /// cache their details.
    pub fn append(&mut self, entries: impl IntoIterator<Item = WorkingSetEntry>) {
        for entry in entries {
            self.detail_cache
                .insert(entry.instance_id.clone(), entry.card.clone());
            match self
                .sub_collections
                .iter_mut()
                .find(|s| s.id == entry.sub_collection_id)
            {
                Some(sub) => sub.entries.push(entry),
                None => {
                    let mut sub = SubCollection::new(
                        entry.sub_collection_id.clone(),
                        entry.sub_collection_id.clone(),
                    );
                    sub.entries.push(entry);
                    self.sub_collections.push(sub);
                }
            }
        }
    }

    /// Remove one entry by instance id.
    pub fn remove(&mut self, instance_id: &str) -> Option<WorkingSetEntry> {
        for sub in &mut self.sub_collections {
            if let Some(pos) = sub.entries.iter().position(|e| e.instance_id == instance_id) {
                self.detail_cache.remove(instance_id);
                return Some(sub.entries.remove(pos));
            }
        }
        None
    }

    /// Drop every ledger-sourced entry for `game` and its cached details.
    /// Returns the number of entries removed.
    pub fn sweep_ledger_entries(&mut self, game: Game) -> usize {
        self.retain_entries(|e| !e.is_ledger_sourced_for(game))
    }

    /// Drop every entry of `game`, whatever its source.
    pub fn clear_game(&mut self, game: Game) -> usize {
        self.retain_entries(|e| e.game() != game)
    }

    fn retain_entries(&mut self, keep: impl Fn(&WorkingSetEntry) -> bool) -> usize {
        let mut removed = Vec::new();
        for sub in &mut self.sub_collections {
            sub.entries.retain(|e| {
                let kept = keep(e);
                if !kept {
                    removed.push(e.instance_id.clone());
                }
                kept
            });
        }
        for id in &removed {
            self.detail_cache.remove(id);
        }
        removed.len()
    }

    /// Next free copy number for a card, counting every source.
    pub fn next_ordinal(&self, catalog_id: &str, game: Game) -> u32 {
        self.entries()
            .filter(|e| e.catalog_id() == catalog_id && e.game() == game)
            .map(|e| e.copy_ordinal)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Keep `(container, catalog id, copy ordinal)` unique. Ledger copies own
    /// `1..=qty`; manual copies that collide move above the highest ordinal.
    pub fn resolve_ordinal_conflicts(&mut self) {
        let mut taken: HashMap<(Game, String), BTreeSet<u32>> = HashMap::new();
        for entry in self.entries().filter(|e| e.source == EntrySource::Ledger) {
            taken
                .entry((entry.game(), entry.catalog_id().to_string()))
                .or_default()
                .insert(entry.copy_ordinal);
        }

        let mut moved = Vec::new();
        for sub in &mut self.sub_collections {
            for entry in sub.entries.iter_mut().filter(|e| e.source == EntrySource::Manual) {
                let used = taken
                    .entry((entry.game(), entry.catalog_id().to_string()))
                    .or_default();
                if used.insert(entry.copy_ordinal) {
                    continue;
                }
                let ordinal = used.iter().next_back().copied().unwrap_or(0) + 1;
                used.insert(ordinal);
                let renumbered = entry.with_ordinal(ordinal);
                moved.push((entry.instance_id.clone(), renumbered.instance_id.clone()));
                *entry = renumbered;
            }
        }
        for (old, new) in moved {
            if let Some(card) = self.detail_cache.remove(&old) {
                self.detail_cache.insert(new, card);
            }
        }
    }

    /// Recompute `page_index` from each entry's position.
    pub fn reindex(&mut self, page_size: usize) {
        let page_size = page_size.max(1);
        for sub in &mut self.sub_collections {
            for (pos, entry) in sub.entries.iter_mut().enumerate() {
                entry.page_index = pos / page_size;
            }
        }
    }

    pub fn select_sub_collection(&mut self, sub_collection_id: &str) -> Result<()> {
        if self.sub_collection(sub_collection_id).is_none() {
            return Err(SyncError::NotFound(format!(
                "sub-collection {} in {}",
                sub_collection_id, self.container_id
            )));
        }
        self.current_sub_collection_id = Some(sub_collection_id.to_string());
        Ok(())
    }

    pub fn set_page_cursor(&mut self, sub_collection_id: &str, page: usize) {
        self.page_cursor_by_sub_collection
            .insert(sub_collection_id.to_string(), page);
    }

    /// Copy suitable for durable storage: ledger-sourced entries and their
    /// cached details are left out.
    pub fn durable_snapshot(&self) -> Self {
        let mut snapshot = self.clone();
        for sub in &mut snapshot.sub_collections {
            sub.entries.retain(|e| e.source != EntrySource::Ledger);
        }
        let kept: BTreeSet<String> = snapshot.entries().map(|e| e.instance_id.clone()).collect();
        snapshot.detail_cache.retain(|id, _| kept.contains(id));
        snapshot
    }
}
