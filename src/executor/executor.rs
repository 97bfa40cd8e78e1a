use crate::core::{MigrationError, Operation, Result};
use crate::storage::SchemaState;

use super::ddl::{
    AddColumnExecutor, AddIndexExecutor, CreateTableExecutor, DropColumnExecutor,
    DropIndexExecutor, DropTableExecutor, RenameColumnExecutor,
};

pub trait OperationExecutor: Send + Sync {
    /// Executor name for debugging
    fn name(&self) -> &'static str;

    fn can_handle(&self, operation: &Operation) -> bool;

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()>;
}

pub struct OperationPipeline {
    pub executors: Vec<Box<dyn OperationExecutor>>,
}

impl OperationPipeline {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    /// Pipeline with an executor registered for every operation kind.
    pub fn with_defaults() -> Self {
        let mut pipeline = Self::new();

        // Table DDL
        pipeline.register(Box::new(CreateTableExecutor));
        pipeline.register(Box::new(DropTableExecutor));

        // Column DDL
        pipeline.register(Box::new(AddColumnExecutor));
        pipeline.register(Box::new(DropColumnExecutor));
        pipeline.register(Box::new(RenameColumnExecutor));

        // Index DDL
        pipeline.register(Box::new(AddIndexExecutor));
        pipeline.register(Box::new(DropIndexExecutor));

        pipeline
    }

    pub fn register(&mut self, executor: Box<dyn OperationExecutor>) {
        self.executors.push(executor);
    }

    pub fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        for executor in &self.executors {
            if executor.can_handle(operation) {
                tracing::trace!(executor = executor.name(), %operation, "executing operation");
                return executor.execute(operation, schema);
            }
        }

        Err(MigrationError::Schema(format!(
            "No executor found for operation {}",
            operation.kind()
        )))
    }
}

impl Default for OperationPipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}
