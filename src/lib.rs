//! Binder card synchronization.
//!
//! Keeps a user's binders - per-game working sets of physical card copies -
//! consistent with a remote quantity ledger. Catalog rows from each game are
//! normalized into one [`CanonicalCard`] shape, ledger rows are expanded into
//! per-copy [`WorkingSetEntry`] values, and each binder's state is persisted
//! as a [`ContainerPartition`].

mod card;
mod config;
mod engine;
mod error;
mod guard;
mod ledger;
mod partition;
mod remote;
mod session;
mod working_set;

pub use card::{
    AdapterRegistry, AttrValue, CanonicalCard, CatalogAdapter, DragonBallAdapter, Game,
    OnePieceAdapter, PokemonAdapter,
};
pub use config::{LedgerMode, SyncConfig};
pub use engine::{BinderSync, ReconcileOutcome};
pub use error::{Result, SyncError};
pub use guard::{LoadKey, LoadState, LoadTicket, SessionLoadGuard};
pub use ledger::{LedgerClient, LedgerRow};
pub use partition::{
    ContainerPartition, FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore,
    PartitionChanged, PartitionStore, SubCollection,
};
pub use remote::{row, Filter, InMemoryRemoteStore, RemoteStore, Row};
pub use session::Session;
pub use working_set::{expand, instance_id, EntrySource, WorkingSetEntry};
