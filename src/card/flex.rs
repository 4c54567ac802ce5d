//! Lenient field decoding for catalog feeds that mix strings and numbers.

use serde::{Deserialize, Deserializer};

use crate::card::Game;
use crate::error::{Result, SyncError};

#[derive(Deserialize)]
#[serde(untagged)]
enum Flex {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Flex>),
}

impl Flex {
    fn into_text(self) -> Option<String> {
        match self {
            Flex::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Flex::Int(n) => Some(n.to_string()),
            Flex::Float(n) => Some(number_text(n)),
            Flex::Bool(b) => Some(b.to_string()),
            Flex::List(items) => {
                let parts: Vec<String> = items.into_iter().filter_map(Flex::into_text).collect();
                (!parts.is_empty()).then(|| parts.join("/"))
            }
        }
    }

    fn into_price(self) -> Option<f64> {
        match self {
            Flex::Text(text) => text.trim().trim_start_matches('$').parse().ok(),
            Flex::Int(n) => Some(n as f64),
            Flex::Float(n) => Some(n),
            Flex::Bool(_) | Flex::List(_) => None,
        }
    }
}

/// `5.0` renders as `"5"`, `1.5` as `"1.5"`.
fn number_text(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// String, number, or list of either; always yields text. Null, missing and
/// blank values become `None`.
pub(crate) fn text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flex>::deserialize(deserializer)?.and_then(Flex::into_text))
}

/// Prices arrive as numbers, numeric strings, or `"$1.25"`. Unparsable is `None`.
pub(crate) fn price<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flex>::deserialize(deserializer)?.and_then(Flex::into_price))
}

pub(crate) fn require_id(id: Option<String>, game: Game) -> Result<String> {
    id.ok_or_else(|| SyncError::malformed(game, "missing catalog id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "text")]
        value: Option<String>,
        #[serde(default, deserialize_with = "price")]
        cost: Option<f64>,
    }

    fn sample(value: serde_json::Value) -> Sample {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn numbers_and_strings_both_become_text() {
        assert_eq!(sample(json!({"value": 5})).value.as_deref(), Some("5"));
        assert_eq!(sample(json!({"value": "5"})).value.as_deref(), Some("5"));
        assert_eq!(sample(json!({"value": 5.0})).value.as_deref(), Some("5"));
        assert_eq!(sample(json!({"value": 1.5})).value.as_deref(), Some("1.5"));
    }

    #[test]
    fn missing_null_and_blank_are_none() {
        assert_eq!(sample(json!({})).value, None);
        assert_eq!(sample(json!({"value": null})).value, None);
        assert_eq!(sample(json!({"value": "  "})).value, None);
    }

    #[test]
    fn lists_are_joined() {
        let p = sample(json!({"value": ["Straw Hat Crew", "Supernovas"]}));
        assert_eq!(p.value.as_deref(), Some("Straw Hat Crew/Supernovas"));
    }

    #[test]
    fn prices_accept_currency_strings() {
        assert_eq!(sample(json!({"cost": "$1.25"})).cost, Some(1.25));
        assert_eq!(sample(json!({"cost": 3})).cost, Some(3.0));
        assert_eq!(sample(json!({"cost": "n/a"})).cost, None);
    }
}
