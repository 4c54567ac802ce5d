//! InMemoryRemoteStore - HashMap-backed remote store for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use super::{Filter, RemoteStore, Row};
use crate::error::{Result, SyncError};

#[derive(Default)]
struct Faults {
    failure: Option<SyncError>,
    latency: Duration,
}

/// In-memory remote store.
///
/// Clone-friendly (cloning shares the same tables), so a test can keep a handle
/// for seeding and inspection while the engine owns another. Counts `select`
/// calls per table and can inject latency or a failure into every call.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,
    selects: Arc<RwLock<HashMap<String, usize>>>,
    faults: Arc<RwLock<Faults>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to `table` without going through the async API.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table.to_string()).or_default().extend(rows);
        }
    }

    /// Snapshot of every row in `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of `select` calls made against `table`.
    pub fn select_count(&self, table: &str) -> usize {
        self.selects
            .read()
            .map(|s| s.get(table).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Make every subsequent call fail with `error`.
    pub fn fail_with(&self, error: SyncError) {
        if let Ok(mut faults) = self.faults.write() {
            faults.failure = Some(error);
        }
    }

    pub fn recover(&self) {
        if let Ok(mut faults) = self.faults.write() {
            faults.failure = None;
        }
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut faults) = self.faults.write() {
            faults.latency = latency;
        }
    }

    async fn round_trip(&self) -> Result<()> {
        let (latency, failure) = {
            let faults = self
                .faults
                .read()
                .map_err(|_| SyncError::Storage("lock poisoned".into()))?;
            (faults.latency, faults.failure.clone())
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn write_tables(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Row>>>> {
        self.tables
            .write()
            .map_err(|_| SyncError::Storage("lock poisoned".into()))
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>> {
        if let Ok(mut selects) = self.selects.write() {
            *selects.entry(table.to_string()).or_default() += 1;
        }
        self.round_trip().await?;

        let tables = self
            .tables
            .read()
            .map_err(|_| SyncError::Storage("lock poisoned".into()))?;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, row: Row) -> Result<()> {
        self.round_trip().await?;
        self.write_tables()?
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(())
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<u64> {
        self.round_trip().await?;
        let mut tables = self.write_tables()?;
        let mut touched = 0;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
                for (column, value) in &patch {
                    row.insert(column.clone(), value.clone());
                }
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        self.round_trip().await?;
        let mut tables = self.write_tables()?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matches_all(row, filters));
        Ok((before - rows.len()) as u64)
    }
}
