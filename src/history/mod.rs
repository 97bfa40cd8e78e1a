// ============================================================================
// Migration History
// ============================================================================
//
// Durable ledger of applied migrations, one stack per context key.
// Records are pushed on a successful `up` and popped on a successful `down`;
// only the most recent record of a context may be erased.
//
// ============================================================================

use crate::core::{MigrationError, MigrationId, Result};
use crate::transaction::TransactionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub id: MigrationId,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    contexts: BTreeMap<String, Vec<AppliedRecord>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of `context_key` in application order.
    pub fn applied(&self, context_key: &str) -> &[AppliedRecord] {
        self.contexts
            .get(context_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn applied_ids(&self, context_key: &str) -> Vec<MigrationId> {
        self.applied(context_key).iter().map(|r| r.id.clone()).collect()
    }

    pub fn contexts(&self) -> Vec<&str> {
        self.contexts.keys().map(|s| s.as_str()).collect()
    }

    pub fn record(
        &mut self,
        context_key: &str,
        id: &MigrationId,
        applied_at: DateTime<Utc>,
    ) -> Result<()> {
        let records = self.contexts.entry(context_key.to_string()).or_default();
        if records.iter().any(|r| &r.id == id) {
            return Err(MigrationError::DuplicateApplication(id.clone()));
        }
        records.push(AppliedRecord {
            id: id.clone(),
            applied_at,
        });
        Ok(())
    }

    pub fn erase(&mut self, context_key: &str, id: &MigrationId) -> Result<()> {
        let records = self
            .contexts
            .get_mut(context_key)
            .ok_or_else(|| MigrationError::NotApplied(id.clone()))?;

        match records.last() {
            Some(last) if &last.id == id => {
                records.pop();
            }
            // Present but not on top: reverting it would break stack order.
            _ => return Err(MigrationError::NotApplied(id.clone())),
        }

        if records.is_empty() {
            self.contexts.remove(context_key);
        }
        Ok(())
    }
}

/// Ledger capability of a target store. Writes are staged in the store
/// transaction `txn` and become visible only when it commits.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn applied(&self, context_key: &str) -> Result<Vec<AppliedRecord>>;

    async fn applied_ids(&self, context_key: &str) -> Result<Vec<MigrationId>> {
        Ok(self
            .applied(context_key)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    async fn record(
        &self,
        txn: TransactionId,
        context_key: &str,
        id: &MigrationId,
        applied_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn erase(&self, txn: TransactionId, context_key: &str, id: &MigrationId) -> Result<()>;
}
