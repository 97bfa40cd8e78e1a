// ============================================================================
// Migration Executor
// ============================================================================
//
// Applies one migration in one direction as a single store transaction:
// every operation, then the ledger update, then commit. Any failure rolls
// the whole transaction back, so a migration is never left half-applied.
// A commit that loses a write-write race with another context is replayed
// on the newer state, up to MAX_COMMIT_ATTEMPTS times.
//
// Per-migration lifecycle:
// ```text
// Pending ──apply──> Applying ──> Applied | Failed
// Applied ──revert──> Reverting ──> Pending | Failed
// ```
//
// ============================================================================

use crate::catalog::MigrationDefinition;
use crate::core::{Direction, MigrationError, Result};
use crate::storage::MigrationStore;
use crate::transaction::TransactionId;
use chrono::Utc;
use std::fmt;

pub const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applying,
    Applied,
    Reverting,
    Failed,
}

impl MigrationState {
    /// State a migration passes through while executing in `direction`.
    pub fn in_flight(direction: Direction) -> Self {
        match direction {
            Direction::Up => MigrationState::Applying,
            Direction::Down => MigrationState::Reverting,
        }
    }

    /// State a migration settles in after executing in `direction`.
    pub fn settled(direction: Direction) -> Self {
        match direction {
            Direction::Up => MigrationState::Applied,
            Direction::Down => MigrationState::Pending,
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Pending => write!(f, "PENDING"),
            MigrationState::Applying => write!(f, "APPLYING"),
            MigrationState::Applied => write!(f, "APPLIED"),
            MigrationState::Reverting => write!(f, "REVERTING"),
            MigrationState::Failed => write!(f, "FAILED"),
        }
    }
}

pub struct MigrationExecutor<'a, S: MigrationStore + ?Sized> {
    store: &'a S,
    context_key: &'a str,
}

impl<'a, S: MigrationStore + ?Sized> MigrationExecutor<'a, S> {
    pub fn new(store: &'a S, context_key: &'a str) -> Self {
        Self { store, context_key }
    }

    /// Run `migration` in `direction`. Returns the settled state; on error the
    /// migration is `Failed` for this invocation and nothing was persisted.
    pub async fn apply(
        &self,
        migration: &MigrationDefinition,
        direction: Direction,
    ) -> Result<MigrationState> {
        tracing::info!(
            migration = %migration.id,
            %direction,
            state = %MigrationState::in_flight(direction),
            "executing migration"
        );

        let mut attempt = 1;
        let outcome = loop {
            match self.apply_in_transaction(migration, direction).await {
                Err(MigrationError::WriteConflict(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(migration = %migration.id, attempt, %reason, "commit conflicted, retrying");
                    attempt += 1;
                }
                outcome => break outcome,
            }
        };

        match outcome {
            Ok(()) => {
                let state = MigrationState::settled(direction);
                tracing::info!(migration = %migration.id, %direction, %state, "migration committed");
                Ok(state)
            }
            Err(e) => {
                tracing::error!(
                    migration = %migration.id,
                    %direction,
                    state = %MigrationState::Failed,
                    error = %e,
                    "migration failed"
                );
                Err(e)
            }
        }
    }

    async fn apply_in_transaction(
        &self,
        migration: &MigrationDefinition,
        direction: Direction,
    ) -> Result<()> {
        let txn = self.store.begin_transaction().await?;

        for operation in migration.operations(direction) {
            if let Err(cause) = self.store.execute_ddl(txn, operation).await {
                self.rollback_quietly(txn).await;
                return Err(MigrationError::OperationFailed {
                    operation: operation.to_string(),
                    cause: cause.to_string(),
                });
            }
        }

        let ledger = match direction {
            Direction::Up => {
                self.store
                    .record(txn, self.context_key, &migration.id, Utc::now())
                    .await
            }
            Direction::Down => self.store.erase(txn, self.context_key, &migration.id).await,
        };
        if let Err(e) = ledger {
            self.rollback_quietly(txn).await;
            return Err(e);
        }

        if let Err(e) = self.store.commit(txn).await {
            self.rollback_quietly(txn).await;
            return Err(e);
        }
        Ok(())
    }

    async fn rollback_quietly(&self, txn: TransactionId) {
        // Commit may already have consumed the transaction.
        if let Err(e) = self.store.rollback(txn).await {
            tracing::debug!(txn = %txn, error = %e, "rollback skipped");
        }
    }
}
