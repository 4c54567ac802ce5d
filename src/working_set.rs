//! Working-set entries - one physical card copy placed in a binder.

use serde::{Deserialize, Serialize};

use crate::card::{CanonicalCard, Game};

/// Where a working-set entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntrySource {
    /// Expanded from a remote ledger row. Never persisted locally.
    Ledger,
    /// Placed by hand; lives only in the partition's own blob.
    Manual,
}

impl EntrySource {
    fn discriminator(&self) -> &'static str {
        match self {
            EntrySource::Ledger => "binder-copy",
            EntrySource::Manual => "manual-copy",
        }
    }
}

/// A single copy of a card. Entries are replaced, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingSetEntry {
    pub instance_id: String,
    pub card: CanonicalCard,
    pub container_id: String,
    pub sub_collection_id: String,
    /// Position within the sub-collection divided by page size.
    pub page_index: usize,
    /// 1-based copy number among entries sharing this card in the container.
    pub copy_ordinal: u32,
    pub source: EntrySource,
}

impl WorkingSetEntry {
    pub fn new(
        container_id: impl Into<String>,
        card: CanonicalCard,
        sub_collection_id: impl Into<String>,
        copy_ordinal: u32,
        source: EntrySource,
    ) -> Self {
        let container_id = container_id.into();
        let instance_id = instance_id(&container_id, &card, source, copy_ordinal);
        Self {
            instance_id,
            card,
            container_id,
            sub_collection_id: sub_collection_id.into(),
            page_index: 0,
            copy_ordinal,
            source,
        }
    }

    pub fn catalog_id(&self) -> &str {
        &self.card.catalog_id
    }

    pub fn game(&self) -> Game {
        self.card.game
    }

    pub fn is_ledger_sourced_for(&self, game: Game) -> bool {
        self.source == EntrySource::Ledger && self.card.game == game
    }

    /// Same copy under a different ordinal; the instance id follows.
    pub fn with_ordinal(&self, copy_ordinal: u32) -> Self {
        Self::new(
            self.container_id.clone(),
            self.card.clone(),
            self.sub_collection_id.clone(),
            copy_ordinal,
            self.source,
        )
    }
}

/// `container-name-catalogId-<source>-copyN`.
pub fn instance_id(
    container_id: &str,
    card: &CanonicalCard,
    source: EntrySource,
    copy_ordinal: u32,
) -> String {
    format!(
        "{}-{}-{}-{}{}",
        container_id,
        card.display_name,
        card.catalog_id,
        source.discriminator(),
        copy_ordinal
    )
}

/// Expand one ledger quantity into copies `1..=qty`.
pub fn expand(
    container_id: &str,
    card: &CanonicalCard,
    sub_collection_id: &str,
    qty: i64,
) -> Vec<WorkingSetEntry> {
    let count = u32::try_from(qty.max(0)).unwrap_or(u32::MAX);
    (1..=count)
        .map(|ordinal| {
            WorkingSetEntry::new(
                container_id,
                card.clone(),
                sub_collection_id,
                ordinal,
                EntrySource::Ledger,
            )
        })
        .collect()
}
