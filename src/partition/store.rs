//! PartitionStore - memory-cached, durably backed partitions with change
//! notifications.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use event_emitter_rs::EventEmitter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ContainerPartition, KeyValueStore};
use crate::card::Game;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

const PARTITION_CHANGED: &str = "partition_changed";

/// Notice sent to subscribers after a partition is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionChanged {
    pub container_id: String,
    pub revision: u64,
    pub entry_count: usize,
}

/// Keyed storage of [`ContainerPartition`]s.
///
/// Reads hit the memory cache first, then the key-value store, and finally
/// fall back to a default built from the game's templates. Every save is a
/// full overwrite. The cache always holds the complete partition; the durable
/// blob holds only what [`ContainerPartition::durable_snapshot`] keeps.
pub struct PartitionStore<K> {
    kv: K,
    cache: Mutex<HashMap<String, ContainerPartition>>,
    emitter: Mutex<EventEmitter>,
    config: SyncConfig,
}

impl<K: KeyValueStore> PartitionStore<K> {
    pub fn new(kv: K, config: SyncConfig) -> Self {
        Self {
            kv,
            cache: Mutex::new(HashMap::new()),
            emitter: Mutex::new(EventEmitter::new()),
            config,
        }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    fn partition_key(&self, container_id: &str) -> String {
        format!("{}:partition:{}", self.config.key_prefix, container_id)
    }

    fn preference_key(&self, name: &str) -> String {
        format!("{}:pref:{}", self.config.key_prefix, name)
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, HashMap<String, ContainerPartition>>> {
        self.cache
            .lock()
            .map_err(|_| SyncError::Storage("partition cache poisoned".into()))
    }

    pub fn create_default(&self, container_id: &str, game: Game) -> ContainerPartition {
        ContainerPartition::create_default(container_id, game)
    }

    /// Load a partition: memory cache, then durable storage, then a default.
    /// A missing or unreadable blob is never an error.
    pub fn load(&self, container_id: &str, game: Game) -> Result<ContainerPartition> {
        let mut cache = self.lock_cache()?;
        Ok(self.load_locked(&mut cache, container_id, game).clone())
    }

    fn load_locked<'c>(
        &self,
        cache: &'c mut HashMap<String, ContainerPartition>,
        container_id: &str,
        game: Game,
    ) -> &'c mut ContainerPartition {
        cache
            .entry(container_id.to_string())
            .or_insert_with(|| match self.read_durable(container_id) {
                Ok(Some(partition)) => partition,
                Ok(None) => self.create_default(container_id, game),
                Err(err) => {
                    warn!(container_id, error = %err, "unreadable partition blob, using default");
                    self.create_default(container_id, game)
                }
            })
    }

    fn read_durable(&self, container_id: &str) -> Result<Option<ContainerPartition>> {
        match self.kv.get(&self.partition_key(container_id))? {
            Some(bytes) => Ok(Some(bitcode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_durable(&self, partition: &ContainerPartition) -> Result<()> {
        let bytes = bitcode::serialize(&partition.durable_snapshot())?;
        self.kv.set(&self.partition_key(&partition.container_id), bytes)
    }

    /// Full overwrite of a partition. The cache is updated even when the
    /// durable write fails; the error is returned for the caller to report.
    pub fn save(&self, partition: &ContainerPartition) -> Result<()> {
        let mut saved = partition.clone();
        saved.revision += 1;
        saved.reindex(self.config.page_size);
        let persisted = self.write_durable(&saved);
        let notice = notice(&saved);
        self.lock_cache()?.insert(saved.container_id.clone(), saved);
        self.notify(notice);
        persisted
    }

    /// Load, mutate and save a partition under the cache lock. Durable write
    /// failures are logged; the in-memory partition stays authoritative.
    pub fn update<T>(
        &self,
        container_id: &str,
        game: Game,
        mutate: impl FnOnce(&mut ContainerPartition) -> T,
    ) -> Result<T> {
        let (result, notice) = {
            let mut cache = self.lock_cache()?;
            let partition = self.load_locked(&mut cache, container_id, game);
            let result = mutate(&mut *partition);
            partition.reindex(self.config.page_size);
            partition.revision += 1;
            if let Err(err) = self.write_durable(partition) {
                warn!(container_id, error = %err, "failed to persist partition");
            }
            (result, notice(partition))
        };
        self.notify(notice);
        Ok(result)
    }

    /// Memory-cached partition, if loaded this session.
    pub fn cached(&self, container_id: &str) -> Result<Option<ContainerPartition>> {
        Ok(self.lock_cache()?.get(container_id).cloned())
    }

    /// Remove a partition from memory and durable storage.
    pub fn delete(&self, container_id: &str) -> Result<bool> {
        let cached = self.lock_cache()?.remove(container_id).is_some();
        let stored = self.kv.remove(&self.partition_key(container_id))?;
        debug!(container_id, "partition deleted");
        Ok(cached || stored)
    }

    /// Remove every partition and preference under this store's prefix.
    pub fn clear_all(&self) -> Result<usize> {
        self.lock_cache()?.clear();
        let prefix = format!("{}:", self.config.key_prefix);
        let keys = self.kv.keys_with_prefix(&prefix)?;
        for key in &keys {
            self.kv.remove(key)?;
        }
        Ok(keys.len())
    }

    pub fn preference(&self, name: &str) -> Result<Option<String>> {
        match self.kv.get(&self.preference_key(name))? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| SyncError::Serde(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn set_preference(&self, name: &str, value: &str) -> Result<()> {
        self.kv
            .set(&self.preference_key(name), value.as_bytes().to_vec())
    }

    /// Register a listener for saved partitions. Returns the listener id.
    ///
    /// Listeners run on the emitter's own threads, after the save completes.
    pub fn subscribe<F>(&self, listener: F) -> Result<String>
    where
        F: Fn(PartitionChanged) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| SyncError::Storage("emitter poisoned".into()))?;
        Ok(emitter.on(PARTITION_CHANGED, move |payload: String| {
            if let Ok(change) = serde_json::from_str::<PartitionChanged>(&payload) {
                listener(change);
            }
        }))
    }

    pub fn unsubscribe(&self, listener_id: &str) -> Result<()> {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| SyncError::Storage("emitter poisoned".into()))?;
        emitter.remove_listener(listener_id);
        Ok(())
    }

    fn notify(&self, change: PartitionChanged) {
        let payload = match serde_json::to_string(&change) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "could not encode partition notice");
                return;
            }
        };
        match self.emitter.lock() {
            Ok(mut emitter) => {
                emitter.emit(PARTITION_CHANGED, payload);
            }
            Err(_) => warn!("emitter poisoned, dropping partition notice"),
        }
    }
}

fn notice(partition: &ContainerPartition) -> PartitionChanged {
    PartitionChanged {
        container_id: partition.container_id.clone(),
        revision: partition.revision,
        entry_count: partition.entry_count(),
    }
}
