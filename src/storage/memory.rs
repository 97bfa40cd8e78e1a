use super::lock::{LockGuard, LockRegistry, acquire_file_lock};
use super::persistence::{DurabilityMode, SnapshotManager, StoreSnapshot};
use super::schema::{Row, SchemaState};
use super::{SchemaStore, StoreState};
use crate::core::{MigrationError, MigrationId, Operation, Result};
use crate::executor::OperationPipeline;
use crate::history::{AppliedRecord, HistoryStore};
use crate::transaction::{TransactionId, TransactionManager};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

struct Committed {
    /// Arc lets readers and new transactions share the state without copying
    state: Arc<StoreState>,
    version: u64,
}

/// Transactional schema store kept in memory, optionally backed by an
/// on-disk snapshot.
///
/// Transactions stage a private copy of the committed state; commit
/// publishes it if nothing else committed in between. With a durable
/// snapshot the file is the source of truth: reads and new transactions
/// pick up commits made by other stores on the same directory, and commit
/// compares against the on-disk version under a directory-wide lock.
pub struct MemoryStore {
    committed: RwLock<Committed>,
    transactions: TransactionManager,
    pipeline: OperationPipeline,
    snapshots: Option<SnapshotManager>,
    locks: LockRegistry,
    lock_dir: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_state(StoreState::default(), 0)
    }

    fn with_state(state: StoreState, version: u64) -> Self {
        Self {
            committed: RwLock::new(Committed {
                state: Arc::new(state),
                version,
            }),
            transactions: TransactionManager::new(),
            pipeline: OperationPipeline::with_defaults(),
            snapshots: None,
            locks: LockRegistry::new(),
            lock_dir: None,
        }
    }

    /// Open a durable store in `data_dir`, recovering the last snapshot.
    pub fn open<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let snapshots = SnapshotManager::new(data_dir, durability_mode);

        let mut store = match snapshots.load()? {
            Some(snapshot) => {
                tracing::info!(
                    path = %snapshots.path().display(),
                    tables = snapshot.metadata.table_count,
                    contexts = snapshot.metadata.context_count,
                    "recovered store snapshot"
                );
                Self::with_state(snapshot.state, snapshot.metadata.committed_version)
            }
            None => Self::new(),
        };

        if durability_mode != DurabilityMode::None {
            store.lock_dir = Some(data_dir.to_path_buf());
        }
        store.snapshots = Some(snapshots);
        Ok(store)
    }

    fn durable_snapshots(&self) -> Option<&SnapshotManager> {
        self.snapshots
            .as_ref()
            .filter(|snapshots| snapshots.durability_mode() != DurabilityMode::None)
    }

    /// Adopt a newer on-disk snapshot written by another store.
    async fn refresh(&self) -> Result<()> {
        let Some(snapshots) = self.durable_snapshots() else {
            return Ok(());
        };
        if let Some(snapshot) = snapshots.load()? {
            let mut committed = self.committed.write().await;
            adopt_if_newer(&mut committed, snapshot);
        }
        Ok(())
    }

    pub async fn committed_version(&self) -> u64 {
        self.committed.read().await.version
    }

    /// Copy of the committed state.
    pub async fn state(&self) -> StoreState {
        (*self.committed.read().await.state).clone()
    }

    pub async fn active_transactions(&self) -> usize {
        self.transactions.active_count().await
    }
}

fn adopt_if_newer(committed: &mut Committed, snapshot: StoreSnapshot) {
    let version = snapshot.metadata.committed_version;
    if version > committed.version {
        tracing::debug!(from = committed.version, to = version, "reloaded store snapshot");
        committed.state = Arc::new(snapshot.state);
        committed.version = version;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn begin_transaction(&self) -> Result<TransactionId> {
        self.refresh().await?;
        let committed = self.committed.read().await;
        let staged = (*committed.state).clone();
        let txn = self.transactions.begin(staged, committed.version).await;
        tracing::trace!(txn = %txn, base_version = committed.version, "transaction started");
        Ok(txn)
    }

    async fn execute_ddl(&self, txn: TransactionId, operation: &Operation) -> Result<()> {
        self.transactions
            .with_transaction(txn, |transaction| {
                self.pipeline
                    .execute(operation, &mut transaction.staged_mut().schema)?;
                transaction.record_operation(operation.clone());
                Ok(())
            })
            .await
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        let transaction = self.transactions.take(txn).await?;
        let mut committed = self.committed.write().await;

        // Held until the new snapshot is in place.
        let _commit_lock = match self.durable_snapshots() {
            Some(snapshots) => {
                let lock = snapshots.lock_for_commit()?;
                if let Some(snapshot) = snapshots.load()? {
                    adopt_if_newer(&mut committed, snapshot);
                }
                Some(lock)
            }
            None => None,
        };

        if committed.version != transaction.base_version() {
            return Err(MigrationError::WriteConflict(format!(
                "{} started at version {}, store is at {}",
                txn,
                transaction.base_version(),
                committed.version
            )));
        }

        let operations = transaction.operations().len();
        let state = transaction.commit();
        let version = committed.version + 1;

        // Durable before visible.
        if let Some(snapshots) = &self.snapshots {
            snapshots.save(&StoreSnapshot::new(state.clone(), version))?;
        }

        committed.state = Arc::new(state);
        committed.version = version;
        tracing::debug!(txn = %txn, version, operations, "transaction committed");
        Ok(())
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        self.transactions.rollback(txn).await
    }

    async fn schema(&self) -> Result<SchemaState> {
        self.refresh().await?;
        Ok(self.committed.read().await.state.schema.clone())
    }

    fn try_lock(&self, context_key: &str) -> Result<LockGuard> {
        match &self.lock_dir {
            Some(dir) => acquire_file_lock(dir, context_key),
            None => self.locks.try_acquire(context_key),
        }
    }

    async fn upsert(&self, txn: TransactionId, table: &str, row: Row) -> Result<bool> {
        self.transactions
            .with_transaction(txn, |transaction| {
                transaction.staged_mut().schema.upsert_row(table, row)
            })
            .await
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn applied(&self, context_key: &str) -> Result<Vec<AppliedRecord>> {
        self.refresh().await?;
        Ok(self
            .committed
            .read()
            .await
            .state
            .history
            .applied(context_key)
            .to_vec())
    }

    async fn record(
        &self,
        txn: TransactionId,
        context_key: &str,
        id: &MigrationId,
        applied_at: DateTime<Utc>,
    ) -> Result<()> {
        self.transactions
            .with_transaction(txn, |transaction| {
                transaction
                    .staged_mut()
                    .history
                    .record(context_key, id, applied_at)
            })
            .await
    }

    async fn erase(&self, txn: TransactionId, context_key: &str, id: &MigrationId) -> Result<()> {
        self.transactions
            .with_transaction(txn, |transaction| {
                transaction.staged_mut().history.erase(context_key, id)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDef, DataType};
    use tempfile::TempDir;

    fn create_users() -> Operation {
        Operation::create_table(
            "Users",
            vec![ColumnDef::new("Username", DataType::Text).not_null()],
            ["Username"],
        )
    }

    fn m1() -> MigrationId {
        MigrationId::parse("202401010000000_CreateUsers").unwrap()
    }

    #[tokio::test]
    async fn test_commit_publishes_schema_and_history_together() {
        let store = MemoryStore::new();
        let txn = store.begin_transaction().await.unwrap();
        store.execute_ddl(txn, &create_users()).await.unwrap();
        store.record(txn, "Blog", &m1(), Utc::now()).await.unwrap();

        // staged only
        assert!(!store.schema().await.unwrap().table_exists("Users"));
        assert!(store.applied("Blog").await.unwrap().is_empty());

        store.commit(txn).await.unwrap();
        assert!(store.schema().await.unwrap().table_exists("Users"));
        assert_eq!(store.applied_ids("Blog").await.unwrap(), vec![m1()]);
        assert_eq!(store.committed_version().await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_everything() {
        let store = MemoryStore::new();
        let txn = store.begin_transaction().await.unwrap();
        store.execute_ddl(txn, &create_users()).await.unwrap();
        store.record(txn, "Blog", &m1(), Utc::now()).await.unwrap();
        store.rollback(txn).await.unwrap();

        assert!(!store.schema().await.unwrap().table_exists("Users"));
        assert!(store.applied("Blog").await.unwrap().is_empty());
        assert_eq!(store.committed_version().await, 0);
        assert_eq!(store.active_transactions().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_commit_conflict() {
        let store = MemoryStore::new();
        let first = store.begin_transaction().await.unwrap();
        let second = store.begin_transaction().await.unwrap();
        store.execute_ddl(first, &create_users()).await.unwrap();
        store.execute_ddl(second, &create_users()).await.unwrap();

        store.commit(first).await.unwrap();
        assert!(matches!(
            store.commit(second).await,
            Err(MigrationError::WriteConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_durable_store_recovers_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();
            let txn = store.begin_transaction().await.unwrap();
            store.execute_ddl(txn, &create_users()).await.unwrap();
            store.record(txn, "Blog", &m1(), Utc::now()).await.unwrap();
            store.commit(txn).await.unwrap();
        }

        let reopened = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();
        assert!(reopened.schema().await.unwrap().table_exists("Users"));
        assert_eq!(reopened.applied_ids("Blog").await.unwrap(), vec![m1()]);
        assert_eq!(reopened.committed_version().await, 1);
    }

    #[tokio::test]
    async fn test_durable_store_sees_commits_from_another_store() {
        let temp_dir = TempDir::new().unwrap();
        let writer = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();
        let reader = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let txn = writer.begin_transaction().await.unwrap();
        writer.execute_ddl(txn, &create_users()).await.unwrap();
        writer.record(txn, "Blog", &m1(), Utc::now()).await.unwrap();
        writer.commit(txn).await.unwrap();

        assert_eq!(reader.applied_ids("Blog").await.unwrap(), vec![m1()]);
        assert!(reader.schema().await.unwrap().table_exists("Users"));
        assert_eq!(reader.committed_version().await, 1);
    }

    #[tokio::test]
    async fn test_durable_commit_rejects_stale_base_from_another_store() {
        let temp_dir = TempDir::new().unwrap();
        let first = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();
        let second = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let stale = second.begin_transaction().await.unwrap();
        second.record(stale, "Passport", &m1(), Utc::now()).await.unwrap();

        let txn = first.begin_transaction().await.unwrap();
        first.record(txn, "Blog", &m1(), Utc::now()).await.unwrap();
        first.commit(txn).await.unwrap();

        assert!(matches!(
            second.commit(stale).await,
            Err(MigrationError::WriteConflict(_))
        ));

        // a fresh transaction starts from the other store's commit
        let txn = second.begin_transaction().await.unwrap();
        second.record(txn, "Passport", &m1(), Utc::now()).await.unwrap();
        second.commit(txn).await.unwrap();

        let reopened = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();
        assert_eq!(reopened.applied_ids("Blog").await.unwrap(), vec![m1()]);
        assert_eq!(reopened.applied_ids("Passport").await.unwrap(), vec![m1()]);
        assert_eq!(reopened.committed_version().await, 2);
    }

    #[tokio::test]
    async fn test_durable_store_uses_file_lock() {
        let temp_dir = TempDir::new().unwrap();
        let first = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();
        let second = MemoryStore::open(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let guard = first.try_lock("Blog").unwrap();
        assert!(matches!(
            second.try_lock("Blog"),
            Err(MigrationError::LockContention(_))
        ));
        drop(guard);
        assert!(second.try_lock("Blog").is_ok());
    }
}
