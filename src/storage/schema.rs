use crate::core::{ColumnDef, IndexDef, MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Reference-data row keyed by column name.
pub type Row = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    indexes: BTreeMap<String, IndexDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, primary_key: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
            indexes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexDef> {
        self.indexes.values()
    }

    pub fn get_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<String, Row>,
    next_row_version: u64,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_version: 1,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Insert or update a row by primary key. Returns `true` when the row
    /// was newly inserted.
    pub fn upsert(&mut self, mut row: Row) -> Result<bool> {
        let table = self.schema.name.clone();
        if self.schema.primary_key.is_empty() {
            return Err(MigrationError::Schema(format!(
                "Table '{}' has no primary key; reference data needs one",
                table
            )));
        }

        for key in row.keys() {
            if !self.schema.has_column(key) {
                return Err(column_not_found(key, &table));
            }
        }

        for column in &self.schema.columns {
            if column.timestamp {
                row.insert(column.name.clone(), serde_json::json!(self.next_row_version));
                continue;
            }
            let value = row
                .entry(column.name.clone())
                .or_insert_with(|| column.default.clone().unwrap_or(serde_json::Value::Null));
            column.validate(value)?;
        }

        let key = self.row_key(&row)?;
        for index in self.schema.indexes.values().filter(|i| i.unique) {
            let candidate = index_key(index, &row);
            let clash = self
                .rows
                .iter()
                .any(|(existing_key, existing)| *existing_key != key && index_key(index, existing) == candidate);
            if clash {
                return Err(MigrationError::Schema(format!(
                    "Unique index '{}' on '{}' violated",
                    index.name, table
                )));
            }
        }

        self.next_row_version += 1;
        Ok(self.rows.insert(key, row).is_none())
    }

    pub fn get_row(&self, key: &[serde_json::Value]) -> Option<&Row> {
        let key = serde_json::to_string(key).ok()?;
        self.rows.get(&key)
    }

    fn row_key(&self, row: &Row) -> Result<String> {
        let mut parts = Vec::with_capacity(self.schema.primary_key.len());
        for column in &self.schema.primary_key {
            match row.get(column) {
                Some(value) if !value.is_null() => parts.push(value.clone()),
                _ => {
                    return Err(MigrationError::Schema(format!(
                        "Primary key column '{}' of '{}' cannot be NULL",
                        column, self.schema.name
                    )));
                }
            }
        }
        serde_json::to_string(&parts)
            .map_err(|e| MigrationError::Schema(format!("Invalid primary key value: {}", e)))
    }
}

fn index_key(index: &IndexDef, row: &Row) -> Vec<serde_json::Value> {
    index
        .columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(serde_json::Value::Null))
        .collect()
}

fn table_not_found(name: &str) -> MigrationError {
    MigrationError::Schema(format!("Table '{}' not found", name))
}

fn column_not_found(column: &str, table: &str) -> MigrationError {
    MigrationError::Schema(format!("Column '{}' not found in table '{}'", column, table))
}

/// The set of tables, columns and indexes a store currently holds.
///
/// Every mutator validates against the current state first and leaves the
/// state untouched when it returns an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaState {
    tables: BTreeMap<String, Table>,
}

impl SchemaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| table_not_found(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| table_not_found(name))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.schema.has_column(column))
    }

    pub fn create_table(
        &mut self,
        name: &str,
        columns: &[ColumnDef],
        primary_key: &[String],
    ) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(MigrationError::Schema(format!(
                "Table '{}' already exists",
                name
            )));
        }
        if columns.is_empty() {
            return Err(MigrationError::Schema(format!(
                "Table '{}' must have at least one column",
                name
            )));
        }

        let mut seen = HashSet::new();
        for column in columns {
            if !seen.insert(column.name.as_str()) {
                return Err(MigrationError::Schema(format!(
                    "Duplicate column '{}' in table '{}'",
                    column.name, name
                )));
            }
        }
        for key in primary_key {
            if !seen.contains(key.as_str()) {
                return Err(column_not_found(key, name));
            }
        }

        let schema = TableSchema::new(name, columns.to_vec(), primary_key.to_vec());
        self.tables.insert(name.to_string(), Table::new(schema));
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| table_not_found(name))
    }

    pub fn add_column(&mut self, table_name: &str, column: &ColumnDef) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if table.schema.has_column(&column.name) {
            return Err(MigrationError::Schema(format!(
                "Column '{}' already exists in table '{}'",
                column.name, table_name
            )));
        }
        if !column.nullable && column.default.is_none() && !column.timestamp && table.row_count() > 0 {
            return Err(MigrationError::Schema(format!(
                "Cannot add NOT NULL column '{}' without a default to non-empty table '{}'",
                column.name, table_name
            )));
        }

        let fill = column.default.clone().unwrap_or(serde_json::Value::Null);
        for row in table.rows.values_mut() {
            row.insert(column.name.clone(), fill.clone());
        }
        table.schema.columns.push(column.clone());
        Ok(())
    }

    pub fn drop_column(&mut self, table_name: &str, column: &str) -> Result<()> {
        let table = self.table_mut(table_name)?;
        let position = table
            .schema
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| column_not_found(column, table_name))?;

        if table.schema.primary_key.iter().any(|k| k == column) {
            return Err(MigrationError::Schema(format!(
                "Column '{}' is part of the primary key of '{}'",
                column, table_name
            )));
        }
        if let Some(index) = table
            .schema
            .indexes
            .values()
            .find(|i| i.columns.iter().any(|c| c == column))
        {
            return Err(MigrationError::Schema(format!(
                "Column '{}' is used by index '{}'",
                column, index.name
            )));
        }
        if table.schema.columns.len() == 1 {
            return Err(MigrationError::Schema(format!(
                "Cannot drop the last column of table '{}'",
                table_name
            )));
        }

        table.schema.columns.remove(position);
        for row in table.rows.values_mut() {
            row.remove(column);
        }
        Ok(())
    }

    pub fn rename_column(&mut self, table_name: &str, column: &str, new_name: &str) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if !table.schema.has_column(column) {
            return Err(column_not_found(column, table_name));
        }
        if table.schema.has_column(new_name) {
            return Err(MigrationError::Schema(format!(
                "Column '{}' already exists in table '{}'",
                new_name, table_name
            )));
        }

        for def in table.schema.columns.iter_mut().filter(|c| c.name == column) {
            def.name = new_name.to_string();
        }
        for key in table.schema.primary_key.iter_mut().filter(|k| k.as_str() == column) {
            *key = new_name.to_string();
        }
        for index in table.schema.indexes.values_mut() {
            for indexed in index.columns.iter_mut().filter(|c| c.as_str() == column) {
                *indexed = new_name.to_string();
            }
        }
        for row in table.rows.values_mut() {
            if let Some(value) = row.remove(column) {
                row.insert(new_name.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn add_index(&mut self, table_name: &str, index: &IndexDef) -> Result<()> {
        let table = self.table_mut(table_name)?;
        if table.schema.indexes.contains_key(&index.name) {
            return Err(MigrationError::Schema(format!(
                "Index '{}' already exists on table '{}'",
                index.name, table_name
            )));
        }
        if index.columns.is_empty() {
            return Err(MigrationError::Schema(format!(
                "Index '{}' must cover at least one column",
                index.name
            )));
        }
        for column in &index.columns {
            if !table.schema.has_column(column) {
                return Err(column_not_found(column, table_name));
            }
        }
        if index.unique {
            let mut seen = HashSet::new();
            for row in table.rows.values() {
                if !seen.insert(serde_json::to_string(&index_key(index, row)).unwrap_or_default()) {
                    return Err(MigrationError::Schema(format!(
                        "Existing rows of '{}' violate unique index '{}'",
                        table_name, index.name
                    )));
                }
            }
        }

        table.schema.indexes.insert(index.name.clone(), index.clone());
        Ok(())
    }

    pub fn drop_index(&mut self, table_name: &str, name: &str) -> Result<()> {
        let table = self.table_mut(table_name)?;
        table
            .schema
            .indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| {
                MigrationError::Schema(format!(
                    "Index '{}' not found on table '{}'",
                    name, table_name
                ))
            })
    }

    pub fn upsert_row(&mut self, table_name: &str, row: Row) -> Result<bool> {
        self.table_mut(table_name)?.upsert(row)
    }
}
