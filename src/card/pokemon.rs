//! Pokémon TCG catalog.

use serde::Deserialize;
use serde_json::Value;

use super::adapter::decode;
use super::flex::{self, require_id};
use super::{AttrValue, CanonicalCard, CatalogAdapter, Game};
use crate::error::Result;

#[derive(Deserialize)]
struct PokemonRecord {
    #[serde(default, deserialize_with = "flex::text")]
    id: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    name: Option<String>,
    #[serde(default, alias = "set", deserialize_with = "flex::text")]
    set_code: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    rarity: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    hp: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    types: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    subtypes: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    supertype: Option<String>,
    #[serde(default, deserialize_with = "flex::price")]
    market_price: Option<f64>,
    #[serde(default, deserialize_with = "flex::text")]
    image_url: Option<String>,
}

pub struct PokemonAdapter;

impl CatalogAdapter for PokemonAdapter {
    fn game(&self) -> Game {
        Game::Pokemon
    }

    fn id_column(&self) -> &'static str {
        "id"
    }

    fn normalize(&self, raw: &Value) -> Result<CanonicalCard> {
        let record: PokemonRecord = decode(raw, Game::Pokemon)?;
        let catalog_id = require_id(record.id, Game::Pokemon)?;
        let display_name = record.name.unwrap_or_else(|| catalog_id.clone());

        let mut card = CanonicalCard::new(catalog_id, display_name, Game::Pokemon);
        card.set_code = record.set_code;
        card.rarity = record.rarity;
        card.price_market = record.market_price;
        card.image_url = record.image_url;

        for (key, value) in [
            ("hp", record.hp),
            ("type", record.types),
            ("subtypes", record.subtypes),
            ("supertype", record.supertype),
        ] {
            if let Some(value) = value {
                card.attributes.insert(key.to_string(), AttrValue::Text(value));
            }
        }
        Ok(card)
    }
}
