//! BinderSync - the view-state controller that keeps binder partitions in
//! step with the remote quantity ledger.
//!
//! All partition and guard mutations go through one `BinderSync`. Remote
//! calls are the only suspension points; no lock is held across them.
//!
//! ## Example
//!
//! ```ignore
//! use binder_sync::{BinderSync, Game, InMemoryKeyValueStore, InMemoryRemoteStore, Session, SyncConfig};
//!
//! let sync = BinderSync::new(
//!     InMemoryRemoteStore::new(),
//!     InMemoryKeyValueStore::new(),
//!     Session::signed_in("user-1"),
//!     SyncConfig::default(),
//! );
//! sync.switch_container("binder-1", Game::OnePiece)?;
//! sync.reconcile("binder-1", Game::OnePiece, false).await?;
//! let partition = sync.partition("binder-1", Game::OnePiece)?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::card::{AdapterRegistry, CanonicalCard, Game};
use crate::config::{LedgerMode, SyncConfig};
use crate::error::{Result, SyncError};
use crate::guard::{LoadKey, LoadTicket, SessionLoadGuard};
use crate::ledger::{LedgerClient, LedgerRow};
use crate::partition::{ContainerPartition, KeyValueStore, PartitionChanged, PartitionStore};
use crate::remote::RemoteStore;
use crate::session::Session;
use crate::working_set::{expand, EntrySource, WorkingSetEntry};

const SELECTED_CONTAINER: &str = "selected_container";
const SELECTED_GAME: &str = "selected_game";
const FETCH_ATTEMPTS: u32 = 3;

/// What a call to [`BinderSync::reconcile`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Already loaded this session; nothing fetched.
    Skipped,
    /// The container or game changed while the fetch was in flight; result discarded.
    Stale,
    Applied {
        ledger_rows: usize,
        entries: usize,
        /// Ledger card ids with no catalog record.
        dangling: Vec<String>,
    },
}

pub struct BinderSync<R, K> {
    ledger: LedgerClient<R>,
    partitions: PartitionStore<K>,
    adapters: AdapterRegistry,
    guard: Mutex<SessionLoadGuard>,
    active: Mutex<Option<LoadKey>>,
    max_copies: u32,
}

impl<R: RemoteStore, K: KeyValueStore> BinderSync<R, K> {
    pub fn new(remote: R, kv: K, session: Session, config: SyncConfig) -> Self {
        Self {
            max_copies: config.max_copies_per_card,
            ledger: LedgerClient::new(remote, session, config.clone()),
            partitions: PartitionStore::new(kv, config),
            adapters: AdapterRegistry::standard(),
            guard: Mutex::new(SessionLoadGuard::new()),
            active: Mutex::new(None),
        }
    }

    /// Replace the catalog adapters (e.g. to add a game-specific override).
    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn ledger(&self) -> &LedgerClient<R> {
        &self.ledger
    }

    pub fn partitions(&self) -> &PartitionStore<K> {
        &self.partitions
    }

    fn guard(&self) -> Result<MutexGuard<'_, SessionLoadGuard>> {
        self.guard
            .lock()
            .map_err(|_| SyncError::Storage("load guard poisoned".into()))
    }

    fn active(&self) -> Result<MutexGuard<'_, Option<LoadKey>>> {
        self.active
            .lock()
            .map_err(|_| SyncError::Storage("active context poisoned".into()))
    }

    /// The container/game the UI is showing, if any.
    pub fn active_context(&self) -> Result<Option<LoadKey>> {
        Ok(self.active()?.clone())
    }

    pub fn partition(&self, container_id: &str, game: Game) -> Result<ContainerPartition> {
        self.partitions.load(container_id, game)
    }

    pub fn subscribe<F>(&self, listener: F) -> Result<String>
    where
        F: Fn(PartitionChanged) + Send + Sync + 'static,
    {
        self.partitions.subscribe(listener)
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Bring the ledger-sourced part of a container's working set in line
    /// with the ledger. At most one fetch per `(container, game)` per session
    /// unless `force_refresh` is set.
    pub async fn reconcile(
        &self,
        container_id: &str,
        game: Game,
        force_refresh: bool,
    ) -> Result<ReconcileOutcome> {
        let key = LoadKey::new(container_id, game);
        let ticket = {
            let mut guard = self.guard()?;
            guard.should_load(&key, force_refresh)
        };
        let Some(ticket) = ticket else {
            debug!(container_id, %game, "already loaded, skipping reconcile");
            return Ok(ReconcileOutcome::Skipped);
        };

        match self.run_reconcile(&ticket).await {
            Ok(outcome) => Ok(outcome),
            Err(SyncError::StaleOperation { .. }) => {
                debug!(container_id, %game, "discarding stale reconcile result");
                Ok(ReconcileOutcome::Stale)
            }
            Err(err) => {
                self.guard()?.release(&ticket);
                Err(err)
            }
        }
    }

    async fn run_reconcile(&self, ticket: &LoadTicket) -> Result<ReconcileOutcome> {
        let LoadKey { container_id, game } = ticket.key().clone();
        let scope = self.ledger_scope(&container_id, game)?;

        for attempt in 1..=FETCH_ATTEMPTS {
            let mark = self.guard()?.write_mark(&scope);
            let fetched = self.fetch(&container_id, game).await?;
            let applied = self.apply(ticket, &scope, mark, |partition| {
                fetched.install(partition, &container_id, game)
            })?;
            let Some((entries, dangling)) = applied else {
                debug!(container_id = %container_id, %game, attempt, "ledger written during fetch, refetching");
                continue;
            };

            if fetched.rows == 0 {
                info!(container_id = %container_id, %game, "ledger empty, cleared ledger entries");
            } else {
                info!(
                    container_id = %container_id,
                    %game,
                    rows = fetched.rows,
                    entries,
                    dangling = dangling.len(),
                    "reconciled"
                );
            }
            return Ok(ReconcileOutcome::Applied {
                ledger_rows: fetched.rows,
                entries,
                dangling,
            });
        }

        warn!(container_id = %container_id, %game, "ledger kept changing during reconcile, giving up");
        self.guard()?.release(ticket);
        Ok(ReconcileOutcome::Stale)
    }

    async fn fetch(&self, container_id: &str, game: Game) -> Result<Fetched> {
        let adapter = self.adapters.get(game)?;
        let rows = self.ledger.list_for_container(game, container_id).await?;
        let card_ids: BTreeSet<String> = rows.iter().map(|r| r.card_id.clone()).collect();
        let cards = self
            .ledger
            .batch_fetch_details(adapter.as_ref(), &card_ids)
            .await?;
        Ok(Fetched {
            rows: rows.len(),
            quantities: quantities(&rows, self.max_copies),
            cards: cards
                .into_iter()
                .map(|card| (card.catalog_id.clone(), card))
                .collect(),
        })
    }

    /// Apply a mutation only if `ticket` is still current. The guard stays
    /// locked for the duration so a concurrent switch cannot slip in between.
    /// `Ok(None)` means a ledger write for `scope` overlapped the fetch.
    fn apply<T>(
        &self,
        ticket: &LoadTicket,
        scope: &LoadKey,
        mark: u64,
        mutate: impl FnOnce(&mut ContainerPartition) -> T,
    ) -> Result<Option<T>> {
        let guard = self.guard()?;
        let key = ticket.key();
        if !guard.is_current(ticket) {
            return Err(SyncError::StaleOperation {
                container_id: key.container_id.clone(),
                game: key.game.to_string(),
            });
        }
        if guard.written_since(scope, mark) {
            return Ok(None);
        }
        let result = self.partitions.update(&key.container_id, key.game, mutate);
        drop(guard);
        result.map(Some)
    }

    /// Guard key for ledger writes. Binders share one scope in owner mode.
    fn ledger_scope(&self, container_id: &str, game: Game) -> Result<LoadKey> {
        Ok(LoadKey::new(self.ledger.scope_id(container_id)?, game))
    }

    /// Issue a ledger write, then run `then` under the guard lock. A reconcile
    /// racing with the write sees it through [`SessionLoadGuard::written_since`]
    /// and refetches instead of overwriting `then`'s placement.
    async fn write_ledger<T, U>(
        &self,
        scope: &LoadKey,
        write: impl Future<Output = Result<T>>,
        then: impl FnOnce(T) -> Result<U>,
    ) -> Result<U> {
        self.guard()?.begin_write(scope);
        let written = write.await;
        let mut guard = self.guard()?;
        guard.end_write(scope);
        let result = written.and_then(then);
        drop(guard);
        result
    }

    // ------------------------------------------------------------------
    // Add / remove
    // ------------------------------------------------------------------

    /// Record one more owned copy in the ledger, then place it in the binder.
    /// A ledger failure leaves the partition untouched.
    pub async fn add_card(
        &self,
        container_id: &str,
        card: &CanonicalCard,
        sub_collection_id: Option<&str>,
    ) -> Result<WorkingSetEntry> {
        let scope = self.ledger_scope(container_id, card.game)?;
        self.write_ledger(
            &scope,
            self.ledger
                .increment(card.game, container_id, &card.catalog_id, 1),
            |_| self.place(container_id, card, sub_collection_id, EntrySource::Ledger),
        )
        .await
    }

    /// Place a copy that exists only in this binder; the ledger is not touched.
    pub fn add_manual_card(
        &self,
        container_id: &str,
        card: &CanonicalCard,
        sub_collection_id: Option<&str>,
    ) -> Result<WorkingSetEntry> {
        self.place(container_id, card, sub_collection_id, EntrySource::Manual)
    }

    fn place(
        &self,
        container_id: &str,
        card: &CanonicalCard,
        sub_collection_id: Option<&str>,
        source: EntrySource,
    ) -> Result<WorkingSetEntry> {
        self.partitions.update(container_id, card.game, |partition| {
            let target = match sub_collection_id {
                Some(id) => id.to_string(),
                None => partition.primary_sub_collection_id(),
            };
            let ordinal = partition.next_ordinal(&card.catalog_id, card.game);
            let entry = WorkingSetEntry::new(container_id, card.clone(), target, ordinal, source);
            partition.append([entry.clone()]);
            entry
        })
    }

    /// Remove a single copy. Ledger-sourced copies are decremented in the
    /// ledger first. A copy that is already gone is not an error: `Ok(None)`.
    pub async fn remove_card(
        &self,
        container_id: &str,
        game: Game,
        instance_id: &str,
    ) -> Result<Option<WorkingSetEntry>> {
        let partition = self.partitions.load(container_id, game)?;
        let Some(entry) = partition.find(instance_id).cloned() else {
            debug!(container_id, instance_id, "card already removed");
            return Ok(None);
        };

        let drop_entry = |_: Option<i64>| {
            self.partitions
                .update(container_id, game, |partition| partition.remove(instance_id))
        };
        if entry.source == EntrySource::Ledger {
            let scope = self.ledger_scope(container_id, entry.game())?;
            self.write_ledger(
                &scope,
                self.ledger
                    .decrement_or_delete(entry.game(), container_id, entry.catalog_id()),
                drop_entry,
            )
            .await?;
        } else {
            drop_entry(None)?;
        }
        Ok(Some(entry))
    }

    // ------------------------------------------------------------------
    // Context switches
    // ------------------------------------------------------------------

    /// Make `container_id` the active container. Load flags for the previous
    /// and the new container are reset so in-flight results for the old one
    /// are discarded and the new one reconciles on open.
    pub fn switch_container(&self, container_id: &str, game: Game) -> Result<ContainerPartition> {
        {
            let mut active = self.active()?;
            let mut guard = self.guard()?;
            if let Some(previous) = active.as_ref() {
                guard.reset_container(&previous.container_id);
            }
            guard.reset_container(container_id);
            *active = Some(LoadKey::new(container_id, game));
        }
        self.remember_selection(container_id, game);
        self.partitions.load(container_id, game)
    }

    /// Change the active game. Load flags for the old and new game are reset.
    pub fn switch_game(&self, game: Game) -> Result<Option<ContainerPartition>> {
        let target = {
            let mut active = self.active()?;
            let mut guard = self.guard()?;
            if let Some(previous) = active.as_ref() {
                guard.reset_game(previous.game);
            }
            guard.reset_game(game);
            if let Some(current) = active.as_mut() {
                current.game = game;
            }
            active.clone()
        };

        let Some(key) = target else {
            self.save_preference(SELECTED_GAME, game.as_str());
            return Ok(None);
        };
        self.remember_selection(&key.container_id, game);
        let partition = self.partitions.update(&key.container_id, game, |partition| {
            partition.selected_game = game;
            partition.clone()
        })?;
        Ok(Some(partition))
    }

    /// Switch (if needed) and reconcile: the UI's "open container".
    pub async fn open_container(
        &self,
        container_id: &str,
        game: Game,
        force_refresh: bool,
    ) -> Result<ReconcileOutcome> {
        let already_active = self.active()?.as_ref() == Some(&LoadKey::new(container_id, game));
        if !already_active {
            self.switch_container(container_id, game)?;
        }
        self.reconcile(container_id, game, force_refresh).await
    }

    /// Restore the container/game selected in a previous session.
    pub fn restore_selection(&self) -> Result<Option<LoadKey>> {
        let container = self.partitions.preference(SELECTED_CONTAINER)?;
        let game = self
            .partitions
            .preference(SELECTED_GAME)?
            .and_then(|g| g.parse::<Game>().ok());
        let restored = match (container, game) {
            (Some(container_id), Some(game)) => Some(LoadKey::new(container_id, game)),
            _ => None,
        };
        *self.active()? = restored.clone();
        Ok(restored)
    }

    fn remember_selection(&self, container_id: &str, game: Game) {
        self.save_preference(SELECTED_CONTAINER, container_id);
        self.save_preference(SELECTED_GAME, game.as_str());
    }

    fn save_preference(&self, name: &str, value: &str) {
        if let Err(err) = self.partitions.set_preference(name, value) {
            warn!(name, error = %err, "failed to persist preference");
        }
    }

    // ------------------------------------------------------------------
    // Binder housekeeping
    // ------------------------------------------------------------------

    pub fn rename_container(&self, container_id: &str, game: Game, name: &str) -> Result<()> {
        self.partitions
            .update(container_id, game, |partition| partition.display_name = name.to_string())
    }

    pub fn select_sub_collection(
        &self,
        container_id: &str,
        game: Game,
        sub_collection_id: &str,
    ) -> Result<()> {
        self.partitions
            .update(container_id, game, |partition| {
                partition.select_sub_collection(sub_collection_id)
            })?
    }

    pub fn set_page_cursor(
        &self,
        container_id: &str,
        game: Game,
        sub_collection_id: &str,
        page: usize,
    ) -> Result<()> {
        self.partitions.update(container_id, game, |partition| {
            partition.set_page_cursor(sub_collection_id, page)
        })
    }

    /// Empty a container: delete its ledger rows for `game` and drop every
    /// entry of that game, ledger-sourced or manual.
    pub async fn clear_container(&self, container_id: &str, game: Game) -> Result<u64> {
        let removed = self.ledger.clear_all(game, container_id).await?;
        self.guard()?.reset(&LoadKey::new(container_id, game));

        let mut partition = self.partitions.load(container_id, game)?;
        partition.clear_game(game);
        if let Err(err) = self.partitions.save(&partition) {
            warn!(container_id, error = %err, "failed to persist cleared partition");
        }
        Ok(removed)
    }

    /// Delete a container's partition and, for binder-keyed ledgers, its rows
    /// in every game.
    pub async fn delete_container(&self, container_id: &str) -> Result<()> {
        if self.ledger_keyed_by_binder() {
            for game in Game::ALL {
                self.ledger.clear_all(game, container_id).await?;
            }
        }
        self.guard()?.reset_container(container_id);
        {
            let mut active = self.active()?;
            if active.as_ref().map(|k| k.container_id.as_str()) == Some(container_id) {
                *active = None;
            }
        }
        self.partitions.delete(container_id)?;
        Ok(())
    }

    fn ledger_keyed_by_binder(&self) -> bool {
        self.ledger.mode() == LedgerMode::Binder
    }

    /// Wipe every local partition and preference. The remote ledger is kept.
    pub fn clear_all_data(&self) -> Result<usize> {
        self.guard()?.reset_all();
        *self.active()? = None;
        self.partitions.clear_all()
    }

    /// Delete rows with quantity at or below zero.
    pub async fn sweep_invalid_quantities(&self, container_id: &str, game: Game) -> Result<u64> {
        self.ledger
            .cleanup_invalid_quantities(game, container_id)
            .await
    }

    /// Explicit repair: delete ledger rows whose card no longer exists in the
    /// catalog. Reconciliation never does this on its own.
    pub async fn prune_dangling(&self, container_id: &str, game: Game) -> Result<Vec<String>> {
        let adapter = self.adapters.get(game)?;
        let rows = self.ledger.list_for_container(game, container_id).await?;
        let card_ids: BTreeSet<String> = rows.iter().map(|r| r.card_id.clone()).collect();
        let known: BTreeSet<String> = self
            .ledger
            .batch_fetch_details(adapter.as_ref(), &card_ids)
            .await?
            .into_iter()
            .map(|c| c.catalog_id)
            .collect();

        let mut pruned = Vec::new();
        for card_id in card_ids.difference(&known) {
            self.ledger.delete_card(game, container_id, card_id).await?;
            warn!(container_id, %game, card_id = %card_id, "pruned dangling ledger row");
            pruned.push(card_id.clone());
        }
        Ok(pruned)
    }
}

/// Result of one ledger list plus catalog lookup.
struct Fetched {
    rows: usize,
    quantities: Vec<(String, u32)>,
    cards: HashMap<String, CanonicalCard>,
}

impl Fetched {
    /// Replace the game's ledger-sourced entries with copies expanded from
    /// this fetch, in ledger order. Returns the copy count and dangling ids.
    fn install(
        &self,
        partition: &mut ContainerPartition,
        container_id: &str,
        game: Game,
    ) -> (usize, Vec<String>) {
        partition.sweep_ledger_entries(game);
        let primary = partition.primary_sub_collection_id();
        let mut added = 0;
        let mut dangling = Vec::new();
        for (card_id, qty) in &self.quantities {
            match self.cards.get(card_id) {
                Some(card) => {
                    let copies = expand(container_id, card, &primary, i64::from(*qty));
                    added += copies.len();
                    partition.append(copies);
                }
                None => {
                    warn!(container_id, %game, card_id = %card_id, "ledger references unknown card, skipping");
                    dangling.push(card_id.clone());
                }
            }
        }
        partition.resolve_ordinal_conflicts();
        (added, dangling)
    }
}

/// Summed quantity per card id, in first-seen ledger order, clamped to
/// `0..=max_copies`.
fn quantities(rows: &[LedgerRow], max_copies: u32) -> Vec<(String, u32)> {
    let mut order: Vec<(String, i64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        match index.get(row.card_id.as_str()) {
            Some(&i) => order[i].1 = order[i].1.saturating_add(row.qty.max(0)),
            None => {
                index.insert(row.card_id.as_str(), order.len());
                order.push((row.card_id.clone(), row.qty.max(0)));
            }
        }
    }
    order
        .into_iter()
        .map(|(card_id, qty)| {
            let capped = u32::try_from(qty).unwrap_or(u32::MAX).min(max_copies);
            if i64::from(capped) < qty {
                warn!(card_id = %card_id, qty, max_copies, "ledger quantity above limit, clamping");
            }
            (card_id, capped)
        })
        .collect()
}
