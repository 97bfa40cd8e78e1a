pub mod engine;
pub mod lock;
pub mod memory;
pub mod persistence;
pub mod schema;

pub use engine::{MigrationStore, SchemaStore};
pub use lock::{LockGuard, LockRegistry};
pub use memory::MemoryStore;
pub use persistence::{DurabilityMode, SnapshotManager, StoreSnapshot};
pub use schema::{Row, SchemaState, Table, TableSchema};

use crate::history::History;
use serde::{Deserialize, Serialize};

/// Everything a store commits atomically: the live schema and the
/// migration ledger of every context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    pub schema: SchemaState,
    pub history: History,
}
