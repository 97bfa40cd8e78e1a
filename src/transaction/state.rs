// ============================================================================
// Transaction State Management
// ============================================================================
//
// Implements the State Pattern for transaction lifecycle management.
// Each transaction moves through defined states: Active -> Committed/Aborted
//
// A transaction works on a private copy of the store state (Copy-on-Write):
// - DDL and ledger writes mutate only the staged copy
// - Commit publishes the staged copy in one step
// - Rollback discards it
//
// ============================================================================

use crate::core::Operation;
use crate::storage::StoreState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted/rolled back
    Aborted,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A store transaction holding its staged copy of the state.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,

    state: TransactionState,

    /// Committed version the staged copy was taken from
    base_version: u64,

    staged: StoreState,

    /// DDL executed so far, in order
    operations: Vec<Operation>,

    /// Start time for diagnostics
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId, base_version: u64, staged: StoreState) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            base_version,
            staged,
            operations: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn staged(&self) -> &StoreState {
        &self.staged
    }

    pub fn staged_mut(&mut self) -> &mut StoreState {
        &mut self.staged
    }

    pub fn record_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Consume the transaction, yielding the staged state to publish.
    pub fn commit(mut self) -> StoreState {
        self.state = TransactionState::Committed;
        self.staged
    }

    pub fn abort(&mut self) {
        self.state = TransactionState::Aborted;
    }
}
