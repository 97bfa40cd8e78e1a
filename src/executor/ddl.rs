use super::OperationExecutor;
use crate::core::{Operation, Result};
use crate::storage::SchemaState;

pub struct CreateTableExecutor;

impl OperationExecutor for CreateTableExecutor {
    fn name(&self) -> &'static str {
        "CREATE_TABLE"
    }

    fn can_handle(&self, operation: &Operation) -> bool {
        matches!(operation, Operation::CreateTable { .. })
    }

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        let Operation::CreateTable {
            name,
            columns,
            primary_key,
        } = operation
        else {
            unreachable!();
        };

        schema.create_table(name, columns, primary_key)
    }
}

pub struct DropTableExecutor;

impl OperationExecutor for DropTableExecutor {
    fn name(&self) -> &'static str {
        "DROP_TABLE"
    }

    fn can_handle(&self, operation: &Operation) -> bool {
        matches!(operation, Operation::DropTable { .. })
    }

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        let Operation::DropTable { name } = operation else {
            unreachable!();
        };

        schema.drop_table(name)
    }
}

pub struct AddColumnExecutor;

impl OperationExecutor for AddColumnExecutor {
    fn name(&self) -> &'static str {
        "ADD_COLUMN"
    }

    fn can_handle(&self, operation: &Operation) -> bool {
        matches!(operation, Operation::AddColumn { .. })
    }

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        let Operation::AddColumn { table, column } = operation else {
            unreachable!();
        };

        schema.add_column(table, column)
    }
}

pub struct DropColumnExecutor;

impl OperationExecutor for DropColumnExecutor {
    fn name(&self) -> &'static str {
        "DROP_COLUMN"
    }

    fn can_handle(&self, operation: &Operation) -> bool {
        matches!(operation, Operation::DropColumn { .. })
    }

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        let Operation::DropColumn { table, name } = operation else {
            unreachable!();
        };

        schema.drop_column(table, name)
    }
}

pub struct RenameColumnExecutor;

impl OperationExecutor for RenameColumnExecutor {
    fn name(&self) -> &'static str {
        "RENAME_COLUMN"
    }

    fn can_handle(&self, operation: &Operation) -> bool {
        matches!(operation, Operation::RenameColumn { .. })
    }

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        let Operation::RenameColumn {
            table,
            name,
            new_name,
        } = operation
        else {
            unreachable!();
        };

        schema.rename_column(table, name, new_name)
    }
}

pub struct AddIndexExecutor;

impl OperationExecutor for AddIndexExecutor {
    fn name(&self) -> &'static str {
        "ADD_INDEX"
    }

    fn can_handle(&self, operation: &Operation) -> bool {
        matches!(operation, Operation::AddIndex { .. })
    }

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        let Operation::AddIndex { table, index } = operation else {
            unreachable!();
        };

        schema.add_index(table, index)
    }
}

pub struct DropIndexExecutor;

impl OperationExecutor for DropIndexExecutor {
    fn name(&self) -> &'static str {
        "DROP_INDEX"
    }

    fn can_handle(&self, operation: &Operation) -> bool {
        matches!(operation, Operation::DropIndex { .. })
    }

    fn execute(&self, operation: &Operation, schema: &mut SchemaState) -> Result<()> {
        let Operation::DropIndex { table, name } = operation else {
            unreachable!();
        };

        schema.drop_index(table, name)
    }
}
