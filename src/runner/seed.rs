use crate::core::Result;
use crate::storage::{Row, SchemaState, SchemaStore};
use crate::transaction::TransactionId;
use async_trait::async_trait;

/// Hook that loads reference data once the schema reaches the latest
/// migration.
///
/// Runs inside its own store transaction after all migrations committed;
/// returning an error rolls back every row written through the session
/// and surfaces as `SeedFailed`. Implementations should be idempotent,
/// since the hook runs again on every `migrate` that ends at latest.
#[async_trait]
pub trait Seeder: Send + Sync {
    async fn seed(&self, session: &mut SeedSession<'_>) -> anyhow::Result<()>;
}

/// Write access handed to a [`Seeder`].
pub struct SeedSession<'a> {
    store: &'a dyn SchemaStore,
    txn: TransactionId,
    context_key: &'a str,
    inserted: usize,
    updated: usize,
}

impl<'a> SeedSession<'a> {
    pub(crate) fn new(store: &'a dyn SchemaStore, txn: TransactionId, context_key: &'a str) -> Self {
        Self {
            store,
            txn,
            context_key,
            inserted: 0,
            updated: 0,
        }
    }

    pub fn context_key(&self) -> &str {
        self.context_key
    }

    /// Insert the row, or update the row with the same primary key.
    pub async fn upsert(&mut self, table: &str, row: Row) -> Result<bool> {
        let inserted = self.store.upsert(self.txn, table, row).await?;
        if inserted {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
        Ok(inserted)
    }

    /// Schema as committed by the migrations, before any seeded rows.
    pub async fn schema(&self) -> Result<SchemaState> {
        self.store.schema().await
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub fn updated(&self) -> usize {
        self.updated
    }
}

/// Adapts a closure that lists reference rows into a [`Seeder`].
///
/// ```ignore
/// let seeder = ClosureSeeder::new(|_schema| {
///     let mut row = Row::new();
///     row.insert("Username".into(), json!("admin"));
///     Ok(vec![("Users".to_string(), row)])
/// });
/// ```
pub struct ClosureSeeder<F> {
    rows: F,
}

impl<F> ClosureSeeder<F>
where
    F: Fn(&SchemaState) -> anyhow::Result<Vec<(String, Row)>> + Send + Sync,
{
    pub fn new(rows: F) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl<F> Seeder for ClosureSeeder<F>
where
    F: Fn(&SchemaState) -> anyhow::Result<Vec<(String, Row)>> + Send + Sync,
{
    async fn seed(&self, session: &mut SeedSession<'_>) -> anyhow::Result<()> {
        let schema = session.schema().await?;
        for (table, row) in (self.rows)(&schema)? {
            session.upsert(&table, row).await?;
        }
        Ok(())
    }
}
