// ============================================================================
// Migration Catalog
// ============================================================================
//
// The append-only, ordered set of known migrations. Definitions are sorted
// by id on construction and never mutated afterwards; two definitions with
// the same id are an authoring error.
//
// ============================================================================

pub mod definition;
pub mod loader;

pub use definition::MigrationDefinition;
pub use loader::{scaffold, write_to_dir};

use crate::core::{MigrationError, MigrationId, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MigrationCatalog {
    /// Arc keeps clones cheap; `with_migration` rebuilds (Copy-on-Write)
    migrations: Arc<Vec<MigrationDefinition>>,
}

impl MigrationCatalog {
    pub fn new(mut migrations: Vec<MigrationDefinition>) -> Result<Self> {
        migrations.sort_by(|a, b| a.id.cmp(&b.id));

        let mut seen = HashSet::new();
        for migration in &migrations {
            if !seen.insert(&migration.id) {
                return Err(MigrationError::InvalidCatalog(format!(
                    "Duplicate migration id '{}'",
                    migration.id
                )));
            }
        }

        Ok(Self {
            migrations: Arc::new(migrations),
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a definition - returns a NEW catalog
    pub fn with_migration(self, migration: MigrationDefinition) -> Result<Self> {
        let mut migrations = (*self.migrations).clone();
        migrations.push(migration);
        Self::new(migrations)
    }

    /// Load every `*.json` definition from a directory.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::new(loader::read_dir(dir.as_ref())?)
    }

    /// All definitions, ascending by id.
    pub fn list(&self) -> &[MigrationDefinition] {
        &self.migrations
    }

    pub fn get(&self, id: &MigrationId) -> Result<&MigrationDefinition> {
        self.migrations
            .binary_search_by(|m| m.id.cmp(id))
            .map(|idx| &self.migrations[idx])
            .map_err(|_| MigrationError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &MigrationId) -> bool {
        self.get(id).is_ok()
    }

    pub fn ids(&self) -> Vec<&MigrationId> {
        self.migrations.iter().map(|m| &m.id).collect()
    }

    pub fn latest(&self) -> Option<&MigrationId> {
        self.migrations.last().map(|m| &m.id)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
