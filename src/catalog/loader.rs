//! Directory-backed migration sources and the `add` scaffolder.
//!
//! Each migration lives in its own `<id>.json` file holding one serialized
//! [`MigrationDefinition`].

use super::MigrationDefinition;
use crate::core::{MigrationError, MigrationId, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MIGRATION_FILE_EXTENSION: &str = "json";

pub(crate) fn read_dir(dir: &Path) -> Result<Vec<MigrationDefinition>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        MigrationError::Io(format!(
            "Failed to read migrations directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(MIGRATION_FILE_EXTENSION) {
            continue;
        }
        migrations.push(read_file(&path)?);
    }

    tracing::debug!(dir = %dir.display(), count = migrations.len(), "loaded migration files");
    Ok(migrations)
}

fn read_file(path: &Path) -> Result<MigrationDefinition> {
    let raw = fs::read_to_string(path).map_err(|e| {
        MigrationError::Io(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    let definition: MigrationDefinition = serde_json::from_str(&raw).map_err(|e| {
        MigrationError::InvalidCatalog(format!("Failed to parse '{}': {}", path.display(), e))
    })?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if stem != definition.id.as_str() {
        return Err(MigrationError::InvalidCatalog(format!(
            "File '{}' declares migration '{}'; file name must match the id",
            path.display(),
            definition.id
        )));
    }

    Ok(definition)
}

/// Build an empty definition for `name`, stamped with `now`.
pub fn scaffold(name: &str, now: DateTime<Utc>) -> Result<MigrationDefinition> {
    Ok(MigrationDefinition::new(MigrationId::generate(name, now)?))
}

/// Write `definition` as pretty JSON into `dir`. Never overwrites an
/// existing file.
pub fn write_to_dir(definition: &MigrationDefinition, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| {
        MigrationError::Io(format!(
            "Failed to create migrations directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let path = dir.join(format!("{}.{}", definition.id, MIGRATION_FILE_EXTENSION));
    let content = serde_json::to_string_pretty(definition)
        .map_err(|e| MigrationError::Io(format!("Failed to serialize migration: {}", e)))?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| {
            MigrationError::Io(format!("Failed to create '{}': {}", path.display(), e))
        })?;
    file.write_all(content.as_bytes())?;
    file.write_all(b"\n")?;

    Ok(path)
}
