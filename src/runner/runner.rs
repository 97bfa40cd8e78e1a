// ============================================================================
// Migration Runner
// ============================================================================
//
// Drives one migration run for one context key:
//
//   try_lock -> read history -> plan -> execute each step -> seed -> unlock
//
// Steps run strictly one after another, each in its own transaction. The
// first failure stops the run and leaves earlier steps applied.
// Cancellation is checked between steps only.
//
// ============================================================================

use super::cancel::CancellationHandle;
use super::seed::{SeedSession, Seeder};
use crate::catalog::MigrationCatalog;
use crate::config::MigrateConfig;
use crate::core::{Direction, MigrationError, MigrationId, Result};
use crate::executor::{MAX_COMMIT_ATTEMPTS, MigrationExecutor};
use crate::history::AppliedRecord;
use crate::planner::{MigrationPlan, Planner, Target};
use crate::storage::{MigrationStore, SchemaStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::Instrument;

/// Outcome of a successful `migrate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub context_key: String,
    pub direction: Direction,
    /// Migrations executed, in execution order
    pub executed: Vec<MigrationId>,
    pub seeded: bool,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.executed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatus {
    pub context_key: String,
    pub applied: Vec<AppliedRecord>,
    /// Catalog migrations absent from the history, ascending
    pub pending: Vec<MigrationId>,
    /// Set when the history is not a prefix of the catalog
    pub divergence: Option<String>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && self.divergence.is_none()
    }
}

pub struct MigrationRunner<S: MigrationStore> {
    catalog: MigrationCatalog,
    store: Arc<S>,
    config: MigrateConfig,
    seeder: Option<Arc<dyn Seeder>>,
    cancellation: CancellationHandle,
}

impl<S: MigrationStore> MigrationRunner<S> {
    pub fn new(catalog: MigrationCatalog, store: Arc<S>, config: MigrateConfig) -> Self {
        Self {
            catalog,
            store,
            config,
            seeder: None,
            cancellation: CancellationHandle::new(),
        }
    }

    pub fn with_seeder<T: Seeder + 'static>(mut self, seeder: T) -> Self {
        self.seeder = Some(Arc::new(seeder));
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationHandle) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn catalog(&self) -> &MigrationCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancellation
    }

    fn context_key(&self) -> &str {
        &self.config.context_key
    }

    /// Bring the context to `target`.
    pub async fn migrate(&self, target: &Target) -> Result<MigrationReport> {
        let span = tracing::info_span!("migrate", context = %self.context_key(), %target);
        self.migrate_locked(target, None).instrument(span).await
    }

    /// Like [`migrate`](Self::migrate), but fails with `InvalidTarget`
    /// before executing anything when reaching `target` would move the
    /// schema in the other direction.
    pub async fn migrate_toward(
        &self,
        direction: Direction,
        target: &Target,
    ) -> Result<MigrationReport> {
        let span = tracing::info_span!(
            "migrate",
            context = %self.context_key(),
            %target,
            %direction
        );
        self.migrate_locked(target, Some(direction))
            .instrument(span)
            .await
    }

    async fn migrate_locked(
        &self,
        target: &Target,
        expected: Option<Direction>,
    ) -> Result<MigrationReport> {
        let _lock = self.store.try_lock(self.context_key())?;

        let applied = self.store.applied_ids(self.context_key()).await?;
        let plan = Planner::new(&self.catalog).plan(&applied, target)?;
        if let Some(expected) = expected {
            if !plan.is_empty() && plan.direction() != expected {
                return Err(MigrationError::InvalidTarget(format!(
                    "reaching '{}' requires migrating {}, not {}",
                    target,
                    plan.direction(),
                    expected
                )));
            }
        }
        if plan.is_empty() {
            tracing::info!(applied = applied.len(), "schema already at target");
        } else {
            tracing::info!(
                direction = %plan.direction(),
                steps = plan.len(),
                "executing migration plan"
            );
        }

        let executed = self.execute_plan(&plan).await?;

        let final_count = match plan.direction() {
            Direction::Up => applied.len() + executed.len(),
            Direction::Down => applied.len() - executed.len(),
        };
        let seeded = match &self.seeder {
            Some(seeder) if self.config.seed_enabled && final_count == self.catalog.len() => {
                self.run_seed(seeder.as_ref()).await?;
                true
            }
            _ => false,
        };

        Ok(MigrationReport {
            context_key: self.context_key().to_string(),
            direction: plan.direction(),
            executed,
            seeded,
        })
    }

    async fn execute_plan(&self, plan: &MigrationPlan) -> Result<Vec<MigrationId>> {
        let executor = MigrationExecutor::new(self.store.as_ref(), self.context_key());
        let mut executed = Vec::with_capacity(plan.len());

        for migration in plan.steps() {
            if self.cancellation.is_cancelled() {
                tracing::warn!(
                    applied = executed.len(),
                    remaining = plan.len() - executed.len(),
                    "migration run cancelled"
                );
                return Err(MigrationError::Cancelled {
                    applied: executed.len(),
                });
            }

            if let Err(e) = executor.apply(migration, plan.direction()).await {
                if !executed.is_empty() {
                    tracing::warn!(
                        applied = executed.len(),
                        "run stopped; earlier migrations remain applied"
                    );
                }
                return Err(e);
            }
            executed.push(migration.id.clone());
        }
        Ok(executed)
    }

    async fn run_seed(&self, seeder: &dyn Seeder) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.seed_once(seeder).await {
                Err(MigrationError::WriteConflict(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(attempt, %reason, "seed commit conflicted, retrying");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn seed_once(&self, seeder: &dyn Seeder) -> Result<()> {
        let store: &dyn SchemaStore = self.store.as_ref();
        let txn = store.begin_transaction().await?;
        let mut session = SeedSession::new(store, txn, self.context_key());

        if let Err(e) = seeder.seed(&mut session).await {
            if let Err(rollback) = store.rollback(txn).await {
                tracing::debug!(txn = %txn, error = %rollback, "rollback skipped");
            }
            tracing::error!(error = %e, "seed failed");
            return Err(MigrationError::SeedFailed(format!("{:#}", e)));
        }

        let (inserted, updated) = (session.inserted(), session.updated());
        if let Err(e) = store.commit(txn).await {
            if let Err(rollback) = store.rollback(txn).await {
                tracing::debug!(txn = %txn, error = %rollback, "rollback skipped");
            }
            return Err(match e {
                MigrationError::WriteConflict(_) => e,
                other => MigrationError::SeedFailed(other.to_string()),
            });
        }

        tracing::info!(inserted, updated, "seed applied");
        Ok(())
    }

    /// Plan for `target` without executing it. Holds the lock while reading
    /// the history so the plan reflects a quiescent state.
    pub async fn plan(&self, target: &Target) -> Result<MigrationPlan> {
        let _lock = self.store.try_lock(self.context_key())?;
        let applied = self.store.applied_ids(self.context_key()).await?;
        Planner::new(&self.catalog).plan(&applied, target)
    }

    pub async fn status(&self) -> Result<MigrationStatus> {
        let applied = self.store.applied(self.context_key()).await?;
        let applied_ids: Vec<MigrationId> = applied.iter().map(|r| r.id.clone()).collect();

        let divergence = match Planner::new(&self.catalog).check_history(&applied_ids) {
            Ok(()) => None,
            Err(MigrationError::HistoryDivergence(reason)) => Some(reason),
            Err(e) => return Err(e),
        };

        let seen: HashSet<&MigrationId> = applied_ids.iter().collect();
        let pending = self
            .catalog
            .ids()
            .into_iter()
            .filter(|id| !seen.contains(id))
            .cloned()
            .collect();

        Ok(MigrationStatus {
            context_key: self.context_key().to_string(),
            applied,
            pending,
            divergence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MigrationDefinition;
    use crate::core::{ColumnDef, DataType, Operation};
    use crate::runner::ClosureSeeder;
    use crate::storage::{MemoryStore, Row};
    use serde_json::json;

    fn catalog() -> MigrationCatalog {
        MigrationCatalog::new(vec![
            MigrationDefinition::new(MigrationId::parse("202401010000000_CreateUsers").unwrap())
                .up(Operation::create_table(
                    "Users",
                    vec![ColumnDef::new("Username", DataType::Text).not_null()],
                    ["Username"],
                ))
                .down(Operation::drop_table("Users")),
            MigrationDefinition::new(MigrationId::parse("202401020000000_AddDisplayName").unwrap())
                .up(Operation::add_column(
                    "Users",
                    ColumnDef::new("DisplayName", DataType::Text),
                ))
                .down(Operation::drop_column("Users", "DisplayName")),
        ])
        .unwrap()
    }

    fn runner() -> MigrationRunner<MemoryStore> {
        MigrationRunner::new(
            catalog(),
            Arc::new(MemoryStore::new()),
            MigrateConfig::new("Blog"),
        )
    }

    #[tokio::test]
    async fn test_migrate_latest_then_noop() {
        let runner = runner();
        let report = runner.migrate(&Target::Latest).await.unwrap();
        assert_eq!(report.direction, Direction::Up);
        assert_eq!(report.executed.len(), 2);

        let report = runner.migrate(&Target::Latest).await.unwrap();
        assert!(report.is_noop());
        assert!(runner.status().await.unwrap().is_up_to_date());
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let runner = runner();
        let err = runner
            .migrate(&Target::Name("Missing".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(_)));

        assert!(runner.migrate(&Target::Latest).await.is_ok());
    }

    #[tokio::test]
    async fn test_migrate_toward_rejects_opposite_direction() {
        let runner = runner();
        runner.migrate(&Target::Latest).await.unwrap();

        let err = runner
            .migrate_toward(Direction::Up, &Target::Initial)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidTarget(_)));
        assert_eq!(runner.status().await.unwrap().applied.len(), 2);

        let report = runner
            .migrate_toward(Direction::Down, &Target::Initial)
            .await
            .unwrap();
        assert_eq!(report.executed.len(), 2);
    }

    #[tokio::test]
    async fn test_status_lists_pending() {
        let runner = runner();
        runner
            .migrate(&Target::Name("CreateUsers".to_string()))
            .await
            .unwrap();

        let status = runner.status().await.unwrap();
        assert_eq!(status.applied.len(), 1);
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.pending[0].name(), "AddDisplayName");
        assert!(status.divergence.is_none());
    }

    #[tokio::test]
    async fn test_seed_skipped_below_latest_and_when_disabled() {
        let seeder = || {
            ClosureSeeder::new(|_schema: &crate::storage::SchemaState| {
                let mut row = Row::new();
                row.insert("Username".to_string(), json!("admin"));
                Ok(vec![("Users".to_string(), row)])
            })
        };

        let partial = runner().with_seeder(seeder());
        let report = partial
            .migrate(&Target::Name("CreateUsers".to_string()))
            .await
            .unwrap();
        assert!(!report.seeded);

        let disabled = MigrationRunner::new(
            catalog(),
            Arc::new(MemoryStore::new()),
            MigrateConfig::new("Blog").seed_enabled(false),
        )
        .with_seeder(seeder());
        let report = disabled.migrate(&Target::Latest).await.unwrap();
        assert!(!report.seeded);
    }
}
