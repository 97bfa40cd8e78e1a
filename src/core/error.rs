use thiserror::Error;

use super::MigrationId;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Migration '{0}' has already been applied")]
    DuplicateApplication(MigrationId),

    #[error("Migration '{0}' is not applied")]
    NotApplied(MigrationId),

    #[error("Migration history diverges from the catalog: {0}")]
    HistoryDivergence(String),

    #[error("Operation '{operation}' failed: {cause}")]
    OperationFailed { operation: String, cause: String },

    #[error("Seed failed: {0}")]
    SeedFailed(String),

    #[error("Migration lock for context '{0}' is held by another runner")]
    LockContention(String),

    #[error("Migration '{0}' not found")]
    NotFound(String),

    #[error("Invalid migration catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Migration run cancelled after {applied} migration(s)")]
    Cancelled { applied: usize },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Write-write conflict: {0}")]
    WriteConflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl MigrationError {
    /// Stable name of the error kind, printed by the CLI on failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateApplication(_) => "DuplicateApplication",
            Self::NotApplied(_) => "NotApplied",
            Self::HistoryDivergence(_) => "HistoryDivergence",
            Self::OperationFailed { .. } => "OperationFailed",
            Self::SeedFailed(_) => "SeedFailed",
            Self::LockContention(_) => "LockContention",
            Self::NotFound(_) => "NotFound",
            Self::InvalidCatalog(_) => "InvalidCatalog",
            Self::InvalidTarget(_) => "InvalidTarget",
            Self::Schema(_) => "Schema",
            Self::Cancelled { .. } => "Cancelled",
            Self::Transaction(_) => "Transaction",
            Self::WriteConflict(_) => "WriteConflict",
            Self::Config(_) => "Config",
            Self::Io(_) => "Io",
        }
    }

    /// Process exit code for the CLI; distinct per kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::HistoryDivergence(_) => 3,
            Self::OperationFailed { .. } => 4,
            Self::SeedFailed(_) => 5,
            Self::LockContention(_) => 6,
            Self::Cancelled { .. } => 7,
            Self::InvalidTarget(_) => 8,
            Self::NotFound(_) => 9,
            Self::InvalidCatalog(_) => 10,
            Self::DuplicateApplication(_) => 11,
            Self::NotApplied(_) => 12,
            Self::Schema(_) => 13,
            Self::Transaction(_) => 14,
            Self::Io(_) => 15,
            Self::WriteConflict(_) => 16,
        }
    }

    /// Whether retrying the same invocation later can succeed without
    /// operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockContention(_)
                | Self::OperationFailed { .. }
                | Self::Cancelled { .. }
                | Self::WriteConflict(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl<T> From<std::sync::PoisonError<T>> for MigrationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Transaction(err.to_string())
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
