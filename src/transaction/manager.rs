// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Transaction, TransactionId};
use crate::core::{MigrationError, Result};
use crate::storage::StoreState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct TransactionManager {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open a transaction staged on a copy of `base` at `base_version`.
    pub async fn begin(&self, base: StoreState, base_version: u64) -> TransactionId {
        let id = TransactionId::new();
        let transaction = Transaction::new(id, base_version, base);
        self.transactions.write().await.insert(id, transaction);
        id
    }

    /// Run `f` against the staged state of an active transaction.
    pub async fn with_transaction<T, F>(&self, txn_id: TransactionId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| not_found(txn_id))?;

        if !transaction.state().is_active() {
            return Err(MigrationError::Transaction(format!(
                "Transaction {} is {}",
                txn_id,
                transaction.state()
            )));
        }

        f(transaction)
    }

    /// Remove an active transaction so the caller can publish it.
    pub async fn take(&self, txn_id: TransactionId) -> Result<Transaction> {
        self.transactions
            .write()
            .await
            .remove(&txn_id)
            .ok_or_else(|| not_found(txn_id))
    }

    pub async fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let mut transaction = self.take(txn_id).await?;
        transaction.abort();
        tracing::debug!(
            txn = %txn_id,
            operations = transaction.operations().len(),
            elapsed_ms = transaction.elapsed().as_millis() as u64,
            "transaction rolled back"
        );
        Ok(())
    }

    pub async fn is_active(&self, txn_id: TransactionId) -> bool {
        self.transactions.read().await.contains_key(&txn_id)
    }

    pub async fn active_count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

fn not_found(txn_id: TransactionId) -> MigrationError {
    MigrationError::Transaction(format!("Transaction {} not found", txn_id))
}
