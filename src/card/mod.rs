//! Card identity - one canonical value object for every supported catalog.
//!
//! Each trading-card game ships its own catalog schema. A [`CatalogAdapter`]
//! per game turns those raw rows into a [`CanonicalCard`], so the rest of the
//! engine never branches on the game beyond looking up the right adapter.

mod adapter;
mod dragon_ball;
mod flex;
mod one_piece;
mod pokemon;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::LedgerMode;
use crate::error::SyncError;

pub use adapter::{AdapterRegistry, CatalogAdapter};
pub use dragon_ball::DragonBallAdapter;
pub use one_piece::OnePieceAdapter;
pub use pokemon::PokemonAdapter;

/// The supported games. Each one is a separate catalog namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Game {
    OnePiece,
    Pokemon,
    DragonBall,
}

impl Game {
    pub const ALL: [Game; 3] = [Game::OnePiece, Game::Pokemon, Game::DragonBall];

    pub fn as_str(&self) -> &'static str {
        match self {
            Game::OnePiece => "one_piece",
            Game::Pokemon => "pokemon",
            Game::DragonBall => "dragon_ball",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Game::OnePiece => "One Piece",
            Game::Pokemon => "Pokémon",
            Game::DragonBall => "Dragon Ball",
        }
    }

    /// Remote table holding the immutable catalog for this game.
    pub fn catalog_table(&self) -> &'static str {
        match self {
            Game::OnePiece => "one_piece_cards",
            Game::Pokemon => "pokemon_cards",
            Game::DragonBall => "dragon_ball_cards",
        }
    }

    /// Remote table holding `(container, card) -> quantity` rows for this game.
    pub fn ledger_table(&self, mode: LedgerMode) -> String {
        match mode {
            LedgerMode::Binder => format!("{}_binder_cards", self.as_str()),
            LedgerMode::Owner => format!("{}_user_cards", self.as_str()),
        }
    }

    /// `(id, name)` of the sub-collections a fresh binder starts with.
    /// The first one is the primary sub-collection.
    pub fn template_sets(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Game::OnePiece => &[
                ("collection", "My Collection"),
                ("op01", "Romance Dawn"),
                ("op02", "Paramount War"),
                ("st01", "Straw Hat Crew"),
            ],
            Game::Pokemon => &[
                ("collection", "My Collection"),
                ("sv1", "Scarlet & Violet"),
                ("sv2", "Paldea Evolved"),
            ],
            Game::DragonBall => &[
                ("collection", "My Collection"),
                ("fb01", "Awakened Pulse"),
                ("fb02", "Blazing Aura"),
            ],
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Game {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Game::ALL
            .into_iter()
            .find(|game| game.as_str() == s)
            .ok_or_else(|| SyncError::NotFound(format!("game {}", s)))
    }
}

/// A game-specific attribute value. Feeds disagree on whether numeric fields
/// are strings or numbers; adapters settle those as `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Number(f64),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(text) => Some(text),
            AttrValue::Number(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(text) => f.write_str(text),
            AttrValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Normalized card. `catalog_id` is unique within `game` and is the join key
/// into the quantity ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCard {
    pub catalog_id: String,
    pub display_name: String,
    pub game: Game,
    pub set_code: Option<String>,
    pub rarity: Option<String>,
    pub attributes: BTreeMap<String, AttrValue>,
    pub price_market: Option<f64>,
    pub price_inventory: Option<f64>,
    pub image_url: Option<String>,
}

impl CanonicalCard {
    pub fn new(catalog_id: impl Into<String>, display_name: impl Into<String>, game: Game) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            display_name: display_name.into(),
            game,
            set_code: None,
            rarity: None,
            attributes: BTreeMap::new(),
            price_market: None,
            price_inventory: None,
            image_url: None,
        }
    }

    pub fn with_rarity(mut self, rarity: impl Into<String>) -> Self {
        self.rarity = Some(rarity.into());
        self
    }

    pub fn with_set_code(mut self, set_code: impl Into<String>) -> Self {
        self.set_code = Some(set_code.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }
}
