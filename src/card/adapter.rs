use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::{CanonicalCard, DragonBallAdapter, Game, OnePieceAdapter, PokemonAdapter};
use crate::error::{Result, SyncError};

/// Maps one game's raw catalog rows into [`CanonicalCard`]s.
pub trait CatalogAdapter: Send + Sync {
    fn game(&self) -> Game;

    /// Catalog column holding the primary identifier (the ledger's `card_id`).
    fn id_column(&self) -> &'static str;

    /// Normalize a single raw row. Fails with `MalformedRecord` when the row has
    /// no usable identifier or is not an object.
    fn normalize(&self, raw: &Value) -> Result<CanonicalCard>;

    /// Normalize a batch, dropping (and logging) rows that fail.
    fn normalize_batch(&self, raws: &[Value]) -> Vec<CanonicalCard> {
        raws.iter()
            .filter_map(|raw| match self.normalize(raw) {
                Ok(card) => Some(card),
                Err(err) => {
                    warn!(game = %self.game(), error = %err, "dropping catalog record");
                    None
                }
            })
            .collect()
    }
}

/// Adapters keyed by game.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Game, Arc<dyn CatalogAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapter for every [`Game`].
    pub fn standard() -> Self {
        Self::new()
            .with(OnePieceAdapter)
            .with(PokemonAdapter)
            .with(DragonBallAdapter)
    }

    /// Register an adapter, replacing any previous one for the same game.
    pub fn with<A: CatalogAdapter + 'static>(mut self, adapter: A) -> Self {
        self.register(Arc::new(adapter));
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn CatalogAdapter>) {
        self.adapters.insert(adapter.game(), adapter);
    }

    pub fn get(&self, game: Game) -> Result<Arc<dyn CatalogAdapter>> {
        self.adapters
            .get(&game)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("catalog adapter for {}", game)))
    }

    /// `normalize(rawRecord, game)`.
    pub fn normalize(&self, raw: &Value, game: Game) -> Result<CanonicalCard> {
        self.get(game)?.normalize(raw)
    }
}

/// Shared decode step: rows must be JSON objects before field-level leniency applies.
pub(super) fn decode<T: serde::de::DeserializeOwned>(raw: &Value, game: Game) -> Result<T> {
    if !raw.is_object() {
        return Err(SyncError::malformed(game, "record is not an object"));
    }
    serde_json::from_value(raw.clone()).map_err(|e| SyncError::malformed(game, e.to_string()))
}
