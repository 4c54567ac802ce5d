//! Quantity ledger - the remote, authoritative record of how many copies of
//! each catalog card a container owns.
//!
//! Rows are `(owner_id, container_id, card_id, quantity)` in one table per game.
//! A row with quantity zero is never kept: decrementing the last copy deletes it.

use std::collections::BTreeSet;
use std::future::Future;

use serde_json::Value;
use tracing::{debug, warn};

use crate::card::{CanonicalCard, CatalogAdapter, Game};
use crate::config::{LedgerMode, SyncConfig};
use crate::error::{Result, SyncError};
use crate::remote::{row, Filter, RemoteStore, Row};
use crate::session::Session;

const OWNER: &str = "owner_id";
const CONTAINER: &str = "container_id";
const CARD: &str = "card_id";
const QUANTITY: &str = "quantity";

/// One persisted ownership record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub container_id: String,
    pub card_id: String,
    /// Signed so drifted rows (zero or negative) can be read and swept.
    pub qty: i64,
}

impl LedgerRow {
    /// Parse a stored row. A row without a card id or with a quantity that is
    /// not a whole number is rejected rather than read as zero.
    fn from_row(row: &Row) -> std::result::Result<Self, &'static str> {
        let card_id = row.get(CARD).and_then(text).ok_or("missing card id")?;
        let container_id = row.get(CONTAINER).and_then(text).unwrap_or_default();
        let qty = row
            .get(QUANTITY)
            .and_then(quantity)
            .ok_or("unreadable quantity")?;
        Ok(Self {
            container_id,
            card_id,
            qty,
        })
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn quantity(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
}

fn whole(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64).then_some(n as i64)
}

/// Client for the per-game quantity tables.
///
/// Every call requires a signed-in [`Session`] and is bounded by the configured
/// remote timeout; an elapsed timeout surfaces as `RemoteUnavailable`.
/// Nothing here retries.
pub struct LedgerClient<R> {
    remote: R,
    session: Session,
    config: SyncConfig,
}

impl<R: RemoteStore> LedgerClient<R> {
    pub fn new(remote: R, session: Session, config: SyncConfig) -> Self {
        Self {
            remote,
            session,
            config,
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mode(&self) -> LedgerMode {
        self.config.ledger_mode
    }

    fn table(&self, game: Game) -> String {
        game.ledger_table(self.config.ledger_mode)
    }

    /// Id the ledger keys `container_id` rows by: the binder itself, or the
    /// signed-in owner in [`LedgerMode::Owner`].
    pub fn scope_id(&self, container_id: &str) -> Result<String> {
        match self.config.ledger_mode {
            LedgerMode::Binder => {
                self.session.require_owner()?;
                Ok(container_id.to_string())
            }
            LedgerMode::Owner => self.session.require_owner(),
        }
    }

    fn scope(&self, container_id: &str) -> Result<Vec<Filter>> {
        let owner = self.session.require_owner()?;
        let mut filters = vec![Filter::eq(OWNER, owner)];
        if self.config.ledger_mode == LedgerMode::Binder {
            filters.push(Filter::eq(CONTAINER, container_id));
        }
        Ok(filters)
    }

    fn card_scope(&self, container_id: &str, card_id: &str) -> Result<Vec<Filter>> {
        let mut filters = self.scope(container_id)?;
        filters.push(Filter::eq(CARD, card_id));
        Ok(filters)
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.remote_timeout();
        tokio::time::timeout(limit, call).await.map_err(|_| {
            SyncError::RemoteUnavailable(format!("remote call timed out after {:?}", limit))
        })?
    }

    async fn current(&self, game: Game, filters: &[Filter]) -> Result<Option<LedgerRow>> {
        let table = self.table(game);
        let rows = self.bounded(self.remote.select(&table, filters)).await?;
        let mut rejected = None;
        for row in &rows {
            match LedgerRow::from_row(row) {
                Ok(parsed) => return Ok(Some(parsed)),
                Err(reason) => rejected = Some(reason),
            }
        }
        match rejected {
            Some(reason) => Err(SyncError::malformed(table, reason)),
            None => Ok(None),
        }
    }

    /// Add `by` copies. Inserts the row when absent. Returns the new quantity.
    pub async fn increment(
        &self,
        game: Game,
        container_id: &str,
        card_id: &str,
        by: u32,
    ) -> Result<i64> {
        let filters = self.card_scope(container_id, card_id)?;
        let table = self.table(game);

        let new_qty = match self.current(game, &filters).await? {
            Some(existing) => {
                let qty = existing.qty.max(0) + i64::from(by);
                self.bounded(self.remote.update(&table, &filters, row([(QUANTITY, qty)])))
                    .await?;
                qty
            }
            None => {
                let owner = self.session.require_owner()?;
                let qty = i64::from(by);
                let new_row = row([
                    (OWNER, Value::from(owner)),
                    (CONTAINER, Value::from(self.scope_id(container_id)?)),
                    (CARD, Value::from(card_id)),
                    (QUANTITY, Value::from(qty)),
                ]);
                self.bounded(self.remote.insert(&table, new_row)).await?;
                qty
            }
        };
        debug!(%game, container_id, card_id, qty = new_qty, "ledger increment");
        Ok(new_qty)
    }

    /// Remove one copy; the last copy deletes the row. Returns the remaining
    /// quantity, `None` when the row is gone. An absent row is a logged no-op.
    pub async fn decrement_or_delete(
        &self,
        game: Game,
        container_id: &str,
        card_id: &str,
    ) -> Result<Option<i64>> {
        let filters = self.card_scope(container_id, card_id)?;
        let table = self.table(game);

        let Some(existing) = self.current(game, &filters).await? else {
            warn!(%game, container_id, card_id, "decrement on absent ledger row");
            return Ok(None);
        };

        if existing.qty > 1 {
            let qty = existing.qty - 1;
            self.bounded(self.remote.update(&table, &filters, row([(QUANTITY, qty)])))
                .await?;
            debug!(%game, container_id, card_id, qty, "ledger decrement");
            Ok(Some(qty))
        } else {
            self.bounded(self.remote.delete(&table, &filters)).await?;
            debug!(%game, container_id, card_id, "ledger row deleted");
            Ok(None)
        }
    }

    /// All rows for a container, in the order the backend returned them.
    pub async fn list_for_container(&self, game: Game, container_id: &str) -> Result<Vec<LedgerRow>> {
        let filters = self.scope(container_id)?;
        let table = self.table(game);
        let rows = self.bounded(self.remote.select(&table, &filters)).await?;
        Ok(rows
            .iter()
            .filter_map(|r| match LedgerRow::from_row(r) {
                Ok(parsed) => Some(parsed),
                Err(reason) => {
                    warn!(%game, container_id, reason, "skipping unreadable ledger row");
                    None
                }
            })
            .collect())
    }

    /// One round trip for every id in `card_ids`. Ids missing from the catalog
    /// and records that fail to normalize are omitted.
    pub async fn batch_fetch_details(
        &self,
        adapter: &dyn CatalogAdapter,
        card_ids: &BTreeSet<String>,
    ) -> Result<Vec<CanonicalCard>> {
        if card_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filters = [Filter::is_in(adapter.id_column(), card_ids.iter().cloned())];
        let table = adapter.game().catalog_table();
        let rows = self.bounded(self.remote.select(table, &filters)).await?;
        let raws: Vec<Value> = rows.into_iter().map(Value::Object).collect();
        Ok(adapter.normalize_batch(&raws))
    }

    /// Delete every row of a container. Returns the number removed.
    pub async fn clear_all(&self, game: Game, container_id: &str) -> Result<u64> {
        let filters = self.scope(container_id)?;
        let table = self.table(game);
        self.bounded(self.remote.delete(&table, &filters)).await
    }

    /// Delete rows with quantity at or below zero.
    pub async fn cleanup_invalid_quantities(&self, game: Game, container_id: &str) -> Result<u64> {
        let mut removed = 0;
        for row in self.list_for_container(game, container_id).await? {
            if row.qty <= 0 {
                warn!(%game, container_id, card_id = %row.card_id, qty = row.qty, "sweeping invalid quantity");
                removed += self.delete_card(game, container_id, &row.card_id).await?;
            }
        }
        Ok(removed)
    }

    /// Delete a single card's row regardless of quantity.
    pub async fn delete_card(&self, game: Game, container_id: &str, card_id: &str) -> Result<u64> {
        let filters = self.card_scope(container_id, card_id)?;
        let table = self.table(game);
        self.bounded(self.remote.delete(&table, &filters)).await
    }
}
