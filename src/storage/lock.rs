//! Advisory exclusive locks scoped to a context key.
//!
//! A [`LockGuard`] releases its lock when dropped, on every exit path.
//! In-memory stores share an in-process registry; durable stores take an
//! OS advisory lock on a `<context>-<hash>.lock` file next to the snapshot,
//! which also excludes runners in other processes. The OS drops the lock
//! when its holder exits, so a crashed runner never leaves the context
//! locked; the file itself is left in place and reused.

use crate::core::{MigrationError, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-process registry of held context keys.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, context_key: &str) -> Result<LockGuard> {
        let mut held = self.held.lock()?;
        if !held.insert(context_key.to_string()) {
            return Err(MigrationError::LockContention(context_key.to_string()));
        }
        Ok(LockGuard {
            context_key: context_key.to_string(),
            release: Release::Registry(self.held.clone()),
        })
    }

    pub fn is_held(&self, context_key: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(context_key))
            .unwrap_or(false)
    }
}

/// Path of the lock file guarding `context_key` inside `dir`.
///
/// The readable part is the sanitized key; the suffix is derived from the
/// raw key, so keys that sanitize alike (`A+B`, `A_B`) get distinct files.
pub fn lock_file_path(dir: &Path, context_key: &str) -> PathBuf {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, context_key.as_bytes()).simple().to_string();
    dir.join(format!("{}-{}.lock", sanitize(context_key), &digest[..8]))
}

/// Take the OS lock on `<dir>/<context>-<hash>.lock` without waiting;
/// fails with `LockContention` while another handle holds it.
pub fn acquire_file_lock(dir: &Path, context_key: &str) -> Result<LockGuard> {
    fs::create_dir_all(dir).map_err(|e| {
        MigrationError::Io(format!("Failed to create lock directory '{}': {}", dir.display(), e))
    })?;

    let path = lock_file_path(dir, context_key);
    let mut file = open_lock_file(&path)?;
    match file.try_lock() {
        Ok(()) => {}
        Err(TryLockError::WouldBlock) => {
            return Err(MigrationError::LockContention(context_key.to_string()));
        }
        Err(TryLockError::Error(e)) => {
            return Err(MigrationError::Io(format!(
                "Failed to lock '{}': {}",
                path.display(),
                e
            )));
        }
    }

    // Dropping `file` on the error path releases the OS lock.
    let token = Uuid::new_v4();
    file.set_len(0)
        .and_then(|()| writeln!(file, "pid={} token={}", std::process::id(), token))
        .map_err(|e| {
            MigrationError::Io(format!("Failed to write lock file '{}': {}", path.display(), e))
        })?;

    tracing::debug!(context = context_key, path = %path.display(), "migration lock acquired");
    Ok(LockGuard {
        context_key: context_key.to_string(),
        release: Release::File(file),
    })
}

/// Blocking exclusive lock on `path`, released when the returned file is
/// dropped.
pub(crate) fn lock_exclusive(path: &Path) -> Result<File> {
    let file = open_lock_file(path)?;
    file.lock().map_err(|e| {
        MigrationError::Io(format!("Failed to lock '{}': {}", path.display(), e))
    })?;
    Ok(file)
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| {
            MigrationError::Io(format!("Failed to open lock file '{}': {}", path.display(), e))
        })
}

fn sanitize(context_key: &str) -> String {
    context_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

#[derive(Debug)]
enum Release {
    Registry(Arc<Mutex<HashSet<String>>>),
    /// Closing the file releases the OS lock.
    File(File),
}

/// Held advisory lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    context_key: String,
    release: Release,
}

impl LockGuard {
    pub fn context_key(&self) -> &str {
        &self.context_key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match &self.release {
            Release::Registry(held) => {
                if let Ok(mut held) = held.lock() {
                    held.remove(&self.context_key);
                }
            }
            Release::File(file) => {
                if let Err(e) = file.unlock() {
                    tracing::warn!(context = %self.context_key, error = %e, "failed to unlock migration lock file");
                }
            }
        }
        tracing::debug!(context = %self.context_key, "migration lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_registry_contention_and_release() {
        let registry = LockRegistry::new();
        let guard = registry.try_acquire("Blog").unwrap();
        assert!(registry.is_held("Blog"));
        assert!(matches!(
            registry.try_acquire("Blog"),
            Err(MigrationError::LockContention(_))
        ));
        // other contexts are independent
        let _other = registry.try_acquire("Passport").unwrap();

        drop(guard);
        assert!(!registry.is_held("Blog"));
        assert!(registry.try_acquire("Blog").is_ok());
    }

    #[test]
    fn test_file_lock_contention_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let key = "CodeFirst.Program+BlogContext";
        let guard = acquire_file_lock(temp_dir.path(), key).unwrap();

        let path = lock_file_path(temp_dir.path(), key);
        assert!(path.exists());
        let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(file_name.starts_with("CodeFirst.Program_BlogContext-"));
        assert!(file_name.ends_with(".lock"));
        assert!(matches!(
            acquire_file_lock(temp_dir.path(), key),
            Err(MigrationError::LockContention(_))
        ));

        drop(guard);
        assert!(acquire_file_lock(temp_dir.path(), key).is_ok());
    }

    #[test]
    fn test_keys_that_sanitize_alike_do_not_collide() {
        let temp_dir = TempDir::new().unwrap();
        assert_ne!(
            lock_file_path(temp_dir.path(), "A+B"),
            lock_file_path(temp_dir.path(), "A_B")
        );

        let _plus = acquire_file_lock(temp_dir.path(), "A+B").unwrap();
        assert!(acquire_file_lock(temp_dir.path(), "A_B").is_ok());
    }

    #[test]
    fn test_lock_file_left_by_dead_process_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let path = lock_file_path(temp_dir.path(), "Blog");
        // a holder that exited without running Drop leaves only the file
        fs::write(&path, "pid=4194304 token=00000000-0000-0000-0000-000000000000\n").unwrap();

        let guard = acquire_file_lock(temp_dir.path(), "Blog").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&format!("pid={} ", std::process::id())));
        drop(guard);
    }

    #[test]
    fn test_lock_exclusive_is_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("commit.lock");
        let held = lock_exclusive(&path).unwrap();
        assert!(matches!(
            open_lock_file(&path).unwrap().try_lock(),
            Err(TryLockError::WouldBlock)
        ));
        drop(held);
        assert!(open_lock_file(&path).unwrap().try_lock().is_ok());
    }
}
