// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Store transactions group a migration's DDL and its ledger update into a
// single unit of work.
//
// Design Patterns Used:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Copy-on-Write: each transaction stages a private copy of the store state
//
// ============================================================================

pub mod manager;
pub mod state;

pub use manager::TransactionManager;
pub use state::{Transaction, TransactionId, TransactionState};
