#![allow(dead_code)]

use binder_sync::{
    row, BinderSync, Game, InMemoryKeyValueStore, InMemoryRemoteStore, LedgerMode, Session,
    SyncConfig,
};
use serde_json::{json, Value};

pub const OWNER: &str = "user-1";
pub const OP_LEDGER: &str = "one_piece_binder_cards";
pub const OP_CATALOG: &str = "one_piece_cards";

pub type Engine = BinderSync<InMemoryRemoteStore, InMemoryKeyValueStore>;

pub struct Harness {
    pub remote: InMemoryRemoteStore,
    pub kv: InMemoryKeyValueStore,
    pub session: Session,
    pub config: SyncConfig,
    pub sync: Engine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let remote = InMemoryRemoteStore::new();
        let kv = InMemoryKeyValueStore::new();
        let session = Session::signed_in(OWNER);
        seed_catalog(&remote);
        let sync = BinderSync::new(remote.clone(), kv.clone(), session.clone(), config.clone());
        Self {
            remote,
            kv,
            session,
            config,
            sync,
        }
    }

    /// A fresh engine over the same remote and local storage: a new app session.
    pub fn restart(&self) -> Engine {
        BinderSync::new(
            self.remote.clone(),
            self.kv.clone(),
            self.session.clone(),
            self.config.clone(),
        )
    }

    pub fn seed_ledger(&self, game: Game, container_id: &str, card_id: &str, qty: i64) {
        self.seed_ledger_value(game, container_id, card_id, json!(qty));
    }

    /// Seed a row whose stored quantity is an arbitrary JSON value.
    pub fn seed_ledger_value(&self, game: Game, container_id: &str, card_id: &str, qty: Value) {
        self.remote.seed(
            &game.ledger_table(LedgerMode::Binder),
            [row([
                ("owner_id", json!(OWNER)),
                ("container_id", json!(container_id)),
                ("card_id", json!(card_id)),
                ("quantity", qty),
            ])],
        );
    }

    pub fn ledger_qty(&self, container_id: &str, card_id: &str) -> Option<i64> {
        self.remote
            .rows(OP_LEDGER)
            .iter()
            .find(|r| r["container_id"] == json!(container_id) && r["card_id"] == json!(card_id))
            .and_then(|r| r["quantity"].as_i64())
    }
}

pub fn seed_catalog(remote: &InMemoryRemoteStore) {
    remote.seed(
        OP_CATALOG,
        [
            row([
                ("card_id", json!("X1")),
                ("card_name", json!("Luffy")),
                ("rarity", json!("SR")),
                ("card_cost", json!(4)),
            ]),
            row([
                ("card_id", json!("OP01-001")),
                ("card_name", json!("Roronoa Zoro")),
                ("rarity", json!("L")),
                ("card_cost", json!("5")),
            ]),
            row([
                ("card_id", json!("OP01-002")),
                ("card_name", json!("Trafalgar Law")),
                ("rarity", json!("SR")),
            ]),
            // No usable id: dropped by normalization.
            row([("card_name", json!("Broken Row"))]),
        ],
    );
    remote.seed(
        "pokemon_cards",
        [row([
            ("id", json!("sv1-25")),
            ("name", json!("Pikachu")),
            ("hp", json!(60)),
        ])],
    );
}
