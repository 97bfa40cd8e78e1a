// ============================================================================
// Schema Operations
// ============================================================================
//
// The primitives a migration is authored from. Each operation is a single
// schema mutation; a migration's `up` and `down` are ordered lists of them.
//
// ============================================================================

use super::{ColumnDef, IndexDef};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        #[serde(default)]
        primary_key: Vec<String>,
    },
    DropTable {
        name: String,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        name: String,
    },
    RenameColumn {
        table: String,
        name: String,
        new_name: String,
    },
    AddIndex {
        table: String,
        index: IndexDef,
    },
    DropIndex {
        table: String,
        name: String,
    },
}

impl Operation {
    pub fn create_table<I, S>(name: impl Into<String>, columns: Vec<ColumnDef>, primary_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operation::CreateTable {
            name: name.into(),
            columns,
            primary_key: primary_key.into_iter().map(Into::into).collect(),
        }
    }

    pub fn drop_table(name: impl Into<String>) -> Self {
        Operation::DropTable { name: name.into() }
    }

    pub fn add_column(table: impl Into<String>, column: ColumnDef) -> Self {
        Operation::AddColumn {
            table: table.into(),
            column,
        }
    }

    pub fn drop_column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Operation::DropColumn {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn rename_column(
        table: impl Into<String>,
        name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Operation::RenameColumn {
            table: table.into(),
            name: name.into(),
            new_name: new_name.into(),
        }
    }

    pub fn add_index(table: impl Into<String>, index: IndexDef) -> Self {
        Operation::AddIndex {
            table: table.into(),
            index,
        }
    }

    pub fn drop_index(table: impl Into<String>, name: impl Into<String>) -> Self {
        Operation::DropIndex {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Get the table affected by this operation
    pub fn table_name(&self) -> &str {
        match self {
            Operation::CreateTable { name, .. } | Operation::DropTable { name } => name,
            Operation::AddColumn { table, .. }
            | Operation::DropColumn { table, .. }
            | Operation::RenameColumn { table, .. }
            | Operation::AddIndex { table, .. }
            | Operation::DropIndex { table, .. } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateTable { .. } => "CREATE_TABLE",
            Operation::DropTable { .. } => "DROP_TABLE",
            Operation::AddColumn { .. } => "ADD_COLUMN",
            Operation::DropColumn { .. } => "DROP_COLUMN",
            Operation::RenameColumn { .. } => "RENAME_COLUMN",
            Operation::AddIndex { .. } => "ADD_INDEX",
            Operation::DropIndex { .. } => "DROP_INDEX",
        }
    }

    /// Check if this operation can discard data when executed
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Operation::DropTable { .. } | Operation::DropColumn { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateTable {
                name,
                columns,
                primary_key,
            } => {
                let columns: Vec<String> = columns.iter().map(ToString::to_string).collect();
                write!(f, "CREATE TABLE {} ({})", name, columns.join(", "))?;
                if !primary_key.is_empty() {
                    write!(f, " PRIMARY KEY ({})", primary_key.join(", "))?;
                }
                Ok(())
            }
            Operation::DropTable { name } => write!(f, "DROP TABLE {}", name),
            Operation::AddColumn { table, column } => {
                write!(f, "ALTER TABLE {} ADD COLUMN {}", table, column)
            }
            Operation::DropColumn { table, name } => {
                write!(f, "ALTER TABLE {} DROP COLUMN {}", table, name)
            }
            Operation::RenameColumn {
                table,
                name,
                new_name,
            } => write!(
                f,
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                table, name, new_name
            ),
            Operation::AddIndex { table, index } => {
                write!(f, "CREATE INDEX ON {} {}", table, index)
            }
            Operation::DropIndex { table, name } => {
                write!(f, "DROP INDEX {} ON {}", name, table)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    #[test]
    fn test_operation_display() {
        let op = Operation::rename_column("Users", "DisplayName", "Display_Name");
        assert_eq!(
            op.to_string(),
            "ALTER TABLE Users RENAME COLUMN DisplayName TO Display_Name"
        );

        let op = Operation::create_table(
            "Users",
            vec![ColumnDef::new("Username", DataType::Text).not_null()],
            ["Username"],
        );
        assert_eq!(
            op.to_string(),
            "CREATE TABLE Users (Username TEXT NOT NULL) PRIMARY KEY (Username)"
        );
    }

    #[test]
    fn test_operation_json_shape() {
        let json = r#"{"op":"drop_column","table":"Users","name":"DisplayName"}"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert_eq!(op, Operation::drop_column("Users", "DisplayName"));
        assert!(op.is_destructive());
        assert_eq!(op.table_name(), "Users");
    }

    #[test]
    fn test_column_defaults_in_json() {
        let json = r#"{"op":"add_column","table":"Users","column":{"name":"DisplayName","data_type":"Text"}}"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        let Operation::AddColumn { column, .. } = op else {
            panic!("expected AddColumn");
        };
        assert!(column.nullable);
        assert!(!column.concurrency_token);
    }
}
