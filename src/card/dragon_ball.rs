//! Dragon Ball Super Fusion World catalog.

use serde::Deserialize;
use serde_json::Value;

use super::adapter::decode;
use super::flex::{self, require_id};
use super::{AttrValue, CanonicalCard, CatalogAdapter, Game};
use crate::error::Result;

#[derive(Deserialize)]
struct DragonBallRecord {
    #[serde(default, deserialize_with = "flex::text")]
    card_number: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    card_name: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    series: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    rarity: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    energy_cost: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    power: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    combo_power: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    card_type: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    color: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    features: Option<String>,
    #[serde(default, deserialize_with = "flex::price")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "flex::text")]
    image_url: Option<String>,
}

pub struct DragonBallAdapter;

impl CatalogAdapter for DragonBallAdapter {
    fn game(&self) -> Game {
        Game::DragonBall
    }

    fn id_column(&self) -> &'static str {
        "card_number"
    }

    fn normalize(&self, raw: &Value) -> Result<CanonicalCard> {
        let record: DragonBallRecord = decode(raw, Game::DragonBall)?;
        let catalog_id = require_id(record.card_number, Game::DragonBall)?;
        let display_name = record.card_name.unwrap_or_else(|| catalog_id.clone());

        let mut card = CanonicalCard::new(catalog_id, display_name, Game::DragonBall);
        // FB01-001 -> FB01
        card.set_code = record
            .series
            .or_else(|| card.catalog_id.split('-').next().map(str::to_string));
        card.rarity = record.rarity;
        card.price_market = record.price;
        card.image_url = record.image_url;

        for (key, value) in [
            ("cost", record.energy_cost),
            ("power", record.power),
            ("counter", record.combo_power),
            ("type", record.card_type),
            ("attribute", record.color),
            ("subtypes", record.features),
        ] {
            if let Some(value) = value {
                card.attributes.insert(key.to_string(), AttrValue::Text(value));
            }
        }
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_code_derived_from_card_number() {
        let card = DragonBallAdapter
            .normalize(&json!({"card_number": "FB01-139", "card_name": "Son Goku", "energy_cost": 4}))
            .unwrap();
        assert_eq!(card.set_code.as_deref(), Some("FB01"));
        assert_eq!(card.attribute("cost"), Some(&AttrValue::Text("4".into())));
    }

    #[test]
    fn explicit_series_wins() {
        let card = DragonBallAdapter
            .normalize(&json!({"card_number": "P-001", "series": "Promo", "price": "0.99"}))
            .unwrap();
        assert_eq!(card.set_code.as_deref(), Some("Promo"));
        assert_eq!(card.price_market, Some(0.99));
    }
}
