//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whose id keys the ledger rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    /// Rows keyed by binder id; each binder has its own quantities.
    #[default]
    Binder,
    /// Rows keyed by the signed-in user; one collection per account, shown
    /// in every binder.
    Owner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cards per binder page.
    pub page_size: usize,
    /// Upper bound on any single remote call, in milliseconds.
    pub remote_timeout_ms: u64,
    pub ledger_mode: LedgerMode,
    /// Most copies of one card a single ledger row may expand into.
    pub max_copies_per_card: u32,
    /// Prefix for keys written to the local key-value store.
    pub key_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 9,
            remote_timeout_ms: 10_000,
            ledger_mode: LedgerMode::Binder,
            max_copies_per_card: 999,
            key_prefix: "binder".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_ledger_mode(mut self, mode: LedgerMode) -> Self {
        self.ledger_mode = mode;
        self
    }

    pub fn with_max_copies_per_card(mut self, max: u32) -> Self {
        self.max_copies_per_card = max;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}
