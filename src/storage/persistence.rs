//! Snapshot persistence for durable stores.
//!
//! Every commit writes the complete store state (schema plus migration
//! history) to a temp file in the data directory and renames it over the
//! previous snapshot, so a crash leaves either the old or the new state.

use super::StoreState;
use super::lock::lock_exclusive;
use crate::core::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

pub const SNAPSHOT_FILE: &str = "rustmigrate.snapshot";
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
pub const COMMIT_LOCK_FILE: &str = "rustmigrate.commit.lock";

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurabilityMode {
    /// fsync the snapshot before it replaces the previous one
    #[default]
    Sync,
    /// write and rename without fsync
    Async,
    /// keep everything in memory
    None,
}

impl std::str::FromStr for DurabilityMode {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "none" | "memory" => Ok(Self::None),
            other => Err(MigrationError::Config(format!(
                "Unknown durability mode '{}' (expected sync, async or none)",
                other
            ))),
        }
    }
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub state: StoreState,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: u64,
    pub committed_version: u64,
    pub table_count: usize,
    pub context_count: usize,
}

impl StoreSnapshot {
    pub fn new(state: StoreState, committed_version: u64) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let table_count = state.schema.list_tables().len();
        let context_count = state.history.contexts().len();

        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            state,
            metadata: SnapshotMetadata {
                created_at,
                committed_version,
                table_count,
                context_count,
            },
        }
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
    commit_lock_path: PathBuf,
    durability_mode: DurabilityMode,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Self {
        Self {
            snapshot_path: data_dir.as_ref().join(SNAPSHOT_FILE),
            commit_lock_path: data_dir.as_ref().join(COMMIT_LOCK_FILE),
            durability_mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }

    /// Block until the caller is the only committer in the data directory,
    /// across every store and process that opened it.
    pub fn lock_for_commit(&self) -> Result<File> {
        if let Some(parent) = self.commit_lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| MigrationError::Io(format!("Failed to create snapshot directory: {}", e)))?;
        }
        lock_exclusive(&self.commit_lock_path)
    }

    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }

        let parent = self
            .snapshot_path
            .parent()
            .ok_or_else(|| MigrationError::Io("Snapshot path has no parent directory".to_string()))?;
        fs::create_dir_all(parent).map_err(|e| MigrationError::Io(format!("Failed to create snapshot directory: {}", e)))?;

        let serialized = rmp_serde::to_vec_named(snapshot).map_err(|e| MigrationError::Io(format!("Failed to serialize snapshot: {}", e)))?;

        let temp = NamedTempFile::new_in(parent).map_err(|e| MigrationError::Io(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(temp);
        writer.write_all(&serialized).map_err(|e| MigrationError::Io(format!("Failed to write snapshot: {}", e)))?;
        writer.flush().map_err(|e| MigrationError::Io(format!("Failed to flush snapshot: {}", e)))?;
        let temp = writer.into_inner().map_err(|e| MigrationError::Io(format!("Failed to flush snapshot: {}", e)))?;

        if self.durability_mode == DurabilityMode::Sync {
            temp.as_file().sync_all().map_err(|e| MigrationError::Io(format!("Failed to sync snapshot: {}", e)))?;
        }

        temp.persist(&self.snapshot_path).map_err(|e| MigrationError::Io(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() { return Ok(None); }
        let mut file = File::open(&self.snapshot_path).map_err(|e| MigrationError::Io(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| MigrationError::Io(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| MigrationError::Io(format!("Failed to deserialize snapshot: {}", e)))?;

        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(MigrationError::Io(format!(
                "Unsupported snapshot format version {} (expected {})",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            fs::remove_file(&self.snapshot_path).map_err(|e| MigrationError::Io(format!("Failed to delete snapshot: {}", e)))?;
        }
        Ok(())
    }
}
