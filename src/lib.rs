// ============================================================================
// rustmigrate Library
// ============================================================================
//
// Versioned schema migrations: an ordered catalog of migrations, a
// per-context history of what has been applied, a planner that diffs the
// two, and a runner that applies each step atomically under an advisory
// lock.
//
// ```ignore
// use rustmigrate::{MemoryStore, MigrateConfig, MigrationCatalog, MigrationRunner, Target};
// use std::sync::Arc;
//
// let catalog = MigrationCatalog::load_dir("migrations")?;
// let store = Arc::new(MemoryStore::open("data", Default::default())?);
// let runner = MigrationRunner::new(catalog, store, MigrateConfig::new("BlogContext"));
// let report = runner.migrate(&Target::Latest).await?;
// ```
//
// ============================================================================

pub mod catalog;
pub mod config;
pub mod core;
pub mod executor;
pub mod history;
pub mod planner;
pub mod runner;
pub mod storage;
pub mod transaction;

pub use catalog::{MigrationCatalog, MigrationDefinition};
pub use config::MigrateConfig;
pub use core::{
    ColumnDef, DataType, Direction, IndexDef, MigrationError, MigrationId, Operation, Result,
};
pub use executor::{MigrationExecutor, MigrationState};
pub use history::{AppliedRecord, History, HistoryStore};
pub use planner::{MigrationPlan, Planner, Target};
pub use runner::{
    CancellationHandle, ClosureSeeder, MigrationReport, MigrationRunner, MigrationStatus,
    SeedSession, Seeder,
};
pub use storage::{
    DurabilityMode, LockGuard, MemoryStore, MigrationStore, Row, SchemaState, SchemaStore,
    StoreState,
};
