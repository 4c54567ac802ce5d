//! Remote row store - the backend the ledger and catalogs live in.
//!
//! Row-level CRUD against named tables with equality and in-set filters.
//! Production hosts adapt their backend client to [`RemoteStore`];
//! [`InMemoryRemoteStore`] serves tests and offline development.

mod in_memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

pub use in_memory::InMemoryRemoteStore;

/// A single row: column name to JSON value.
pub type Row = Map<String, Value>;

/// Row filter. All filters passed to one call must match (logical AND).
///
/// Strings and numbers compare by their text form, so `"25"` matches `25`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(column, value) => row.get(column).is_some_and(|v| same(v, value)),
            Filter::In(column, values) => row
                .get(column)
                .is_some_and(|v| values.iter().any(|candidate| same(v, candidate))),
        }
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim() == n.to_string()
        }
        _ => a == b,
    }
}

/// Row-level CRUD. Every call is a network round trip in production.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Rows of `table` matching every filter.
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>>;

    async fn insert(&self, table: &str, row: Row) -> Result<()>;

    /// Merge `patch` into matching rows. Returns the number of rows touched.
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<u64>;

    /// Delete matching rows. Returns the number removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64>;
}

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Row
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_filter() {
        let r = row([("card_id", json!("OP01-001")), ("quantity", json!(2))]);
        assert!(Filter::eq("card_id", "OP01-001").matches(&r));
        assert!(!Filter::eq("card_id", "OP01-002").matches(&r));
        assert!(!Filter::eq("missing", "x").matches(&r));
    }

    #[test]
    fn in_filter() {
        let r = row([("card_id", "sv1-25")]);
        assert!(Filter::is_in("card_id", ["sv1-1", "sv1-25"]).matches(&r));
        assert!(!Filter::is_in("card_id", Vec::<String>::new()).matches(&r));
    }

    #[test]
    fn numeric_ids_match_their_text_form() {
        let r = row([("id", json!(25))]);
        assert!(Filter::is_in("id", ["25", "26"]).matches(&r));
        assert!(Filter::eq("id", "25").matches(&r));
        assert!(!Filter::eq("id", "250").matches(&r));
    }
}
