use super::lock::LockGuard;
use super::schema::{Row, SchemaState};
use crate::core::{Operation, Result};
use crate::history::HistoryStore;
use crate::transaction::TransactionId;
use async_trait::async_trait;

/// Schema-mutation capability of a target store.
///
/// Everything executed under one `TransactionId` becomes visible together
/// on `commit` or not at all.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn begin_transaction(&self) -> Result<TransactionId>;

    /// Apply one operation to the transaction's staged schema.
    async fn execute_ddl(&self, txn: TransactionId, operation: &Operation) -> Result<()>;

    async fn commit(&self, txn: TransactionId) -> Result<()>;

    async fn rollback(&self, txn: TransactionId) -> Result<()>;

    /// Committed schema.
    async fn schema(&self) -> Result<SchemaState>;

    /// Take the advisory migration lock for `context_key` without waiting.
    fn try_lock(&self, context_key: &str) -> Result<LockGuard>;

    /// Insert or update a reference row inside `txn`. Returns `true` when
    /// the row was inserted.
    async fn upsert(&self, txn: TransactionId, table: &str, row: Row) -> Result<bool>;
}

/// A store the migration runner can drive: schema and ledger in one
/// transactional unit.
pub trait MigrationStore: SchemaStore + HistoryStore {}

impl<T: SchemaStore + HistoryStore> MigrationStore for T {}
