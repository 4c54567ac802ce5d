//! One Piece card game catalog.

use serde::Deserialize;
use serde_json::Value;

use super::adapter::decode;
use super::flex::{self, require_id};
use super::{AttrValue, CanonicalCard, CatalogAdapter, Game};
use crate::error::Result;

#[derive(Deserialize)]
struct OnePieceRecord {
    #[serde(default, alias = "id", deserialize_with = "flex::text")]
    card_id: Option<String>,
    #[serde(default, alias = "name", deserialize_with = "flex::text")]
    card_name: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    set_id: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    rarity: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    card_cost: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    card_power: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    counter_amount: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    card_type: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    attribute: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    sub_types: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    life: Option<String>,
    #[serde(default, deserialize_with = "flex::text")]
    trigger_effect: Option<String>,
    #[serde(default, deserialize_with = "flex::price")]
    market_price: Option<f64>,
    #[serde(default, deserialize_with = "flex::price")]
    inventory_price: Option<f64>,
    #[serde(default, alias = "image_url", deserialize_with = "flex::text")]
    card_image: Option<String>,
}

pub struct OnePieceAdapter;

impl CatalogAdapter for OnePieceAdapter {
    fn game(&self) -> Game {
        Game::OnePiece
    }

    fn id_column(&self) -> &'static str {
        "card_id"
    }

    fn normalize(&self, raw: &Value) -> Result<CanonicalCard> {
        let record: OnePieceRecord = decode(raw, Game::OnePiece)?;
        let catalog_id = require_id(record.card_id, Game::OnePiece)?;
        let display_name = record.card_name.unwrap_or_else(|| catalog_id.clone());

        let mut card = CanonicalCard::new(catalog_id, display_name, Game::OnePiece);
        card.set_code = record.set_id;
        card.rarity = record.rarity;
        card.price_market = record.market_price;
        card.price_inventory = record.inventory_price;
        card.image_url = record.card_image;

        let attributes = [
            ("cost", record.card_cost),
            ("power", record.card_power),
            ("counter", record.counter_amount),
            ("type", record.card_type),
            ("attribute", record.attribute),
            ("subtypes", record.sub_types),
            ("life", record.life),
            ("trigger", record.trigger_effect),
        ];
        for (key, value) in attributes {
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
    use crate::error::SyncError;
    use serde_json::json;

    #[test]
    fn normalizes_full_record() {
        let raw = json!({
            "card_id": "OP01-001",
            "card_name": "Roronoa Zoro",
            "set_id": "OP01",
            "rarity": "L",
            "card_cost": 5,
            "card_power": "5000",
            "counter_amount": null,
            "card_type": "LEADER",
            "attribute": "Slash",
            "sub_types": ["Supernovas", "Straw Hat Crew"],
            "life": 5,
            "market_price": "$12.40",
            "inventory_price": 10.5,
            "card_image": "https://img/OP01-001.png"
        });
        let card = OnePieceAdapter.normalize(&raw).unwrap();
        assert_eq!(card.catalog_id, "OP01-001");
        assert_eq!(card.set_code.as_deref(), Some("OP01"));
        assert_eq!(card.attribute("cost"), Some(&AttrValue::Text("5".into())));
        assert_eq!(card.attribute("power"), Some(&AttrValue::Text("5000".into())));
        assert_eq!(card.attribute("counter"), None);
        assert_eq!(
            card.attribute("subtypes"),
            Some(&AttrValue::Text("Supernovas/Straw Hat Crew".into()))
        );
        assert_eq!(card.price_market, Some(12.4));
        assert_eq!(card.price_inventory, Some(10.5));
    }

    #[test]
    fn cost_as_string_or_number_is_equivalent() {
        let a = OnePieceAdapter
            .normalize(&json!({"card_id": "OP01-016", "card_cost": 3}))
            .unwrap();
        let b = OnePieceAdapter
            .normalize(&json!({"card_id": "OP01-016", "card_cost": "3"}))
            .unwrap();
        assert_eq!(a.attribute("cost"), b.attribute("cost"));
    }

    #[test]
    fn missing_name_falls_back_to_id() {
        let card = OnePieceAdapter.normalize(&json!({"card_id": "ST01-012"})).unwrap();
        assert_eq!(card.display_name, "ST01-012");
    }

    #[test]
    fn missing_id_is_malformed() {
        let err = OnePieceAdapter
            .normalize(&json!({"card_name": "Nami"}))
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
    }
}
