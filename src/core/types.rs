use super::{MigrationError, Result};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref MIGRATION_ID_PATTERN: Regex =
        Regex::new(r"^(\d{15})_([A-Za-z0-9_]+)$").expect("migration id pattern is valid");
}

/// Width of the numeric prefix of a [`MigrationId`]:
/// `yyyyMMddHHmmss` followed by one digit of sub-second precision.
pub const MIGRATION_TIMESTAMP_WIDTH: usize = 15;

/// Identifier of a migration, e.g. `202212200104283_UseFluentAPI`.
///
/// The fixed-width timestamp prefix makes the lexicographic order of the raw
/// string equal to the chronological authoring order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MigrationId(String);

impl MigrationId {
    pub fn parse(raw: &str) -> Result<Self> {
        if MIGRATION_ID_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(MigrationError::InvalidCatalog(format!(
                "'{}' is not a valid migration id (expected <15 digit timestamp>_<Name>)",
                raw
            )))
        }
    }

    /// Build a fresh id for `name` stamped with `now`.
    pub fn generate(name: &str, now: DateTime<Utc>) -> Result<Self> {
        let tenths = now.timestamp_subsec_millis() / 100;
        let raw = format!("{}{}_{}", now.format("%Y%m%d%H%M%S"), tenths, name);
        Self::parse(&raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn timestamp(&self) -> &str {
        &self.0[..MIGRATION_TIMESTAMP_WIDTH]
    }

    pub fn name(&self) -> &str {
        &self.0[MIGRATION_TIMESTAMP_WIDTH + 1..]
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MigrationId {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MigrationId {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MigrationId> for String {
    fn from(id: MigrationId) -> Self {
        id.0
    }
}

/// Direction in which a migration's operations are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    BigInt,
    Float,
    Boolean,
    Text,
    Timestamp,
    Binary,
}

impl DataType {
    /// Check whether a reference-data value fits this column type.
    pub fn is_compatible(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value as Json;
        match (self, value) {
            (_, Json::Null) => true,
            (DataType::Integer | DataType::BigInt, Json::Number(n)) => n.is_i64() || n.is_u64(),
            (DataType::Float, Json::Number(_)) => true,
            (DataType::Boolean, Json::Bool(_)) => true,
            (DataType::Text | DataType::Timestamp, Json::String(_)) => true,
            (DataType::Binary, Json::String(_) | Json::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Binary => write!(f, "BINARY"),
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// Column definition carried by `CreateTable` and `AddColumn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    /// Participates in optimistic concurrency checks.
    #[serde(default)]
    pub concurrency_token: bool,
    /// Store-generated row version.
    #[serde(default)]
    pub timestamp: bool,
    /// Provider specific column type, e.g. `ntext`.
    #[serde(default)]
    pub store_type: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            max_length: None,
            min_length: None,
            concurrency_token: false,
            timestamp: false,
            store_type: None,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn min_length(mut self, len: u32) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn concurrency_token(mut self) -> Self {
        self.concurrency_token = true;
        self
    }

    /// Row-version column; implies a non-nullable concurrency token.
    pub fn row_version(mut self) -> Self {
        self.timestamp = true;
        self.concurrency_token = true;
        self.nullable = false;
        self
    }

    pub fn store_type(mut self, store_type: impl Into<String>) -> Self {
        self.store_type = Some(store_type.into());
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Validate one reference-data value against this column.
    pub fn validate(&self, value: &serde_json::Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable && !self.timestamp {
                return Err(MigrationError::Schema(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(MigrationError::Schema(format!(
                "Column '{}' expects type {}, got {}",
                self.name, self.data_type, value
            )));
        }

        if let Some(text) = value.as_str() {
            let len = text.chars().count() as u32;
            if let Some(max) = self.max_length
                && len > max
            {
                return Err(MigrationError::Schema(format!(
                    "Column '{}' must be {} characters or less",
                    self.name, max
                )));
            }
            if let Some(min) = self.min_length
                && len < min
            {
                return Err(MigrationError::Schema(format!(
                    "Column '{}' must be at least {} characters",
                    self.name, min
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        if let Some(max) = self.max_length {
            write!(f, "({})", max)?;
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        if self.timestamp {
            write!(f, " ROWVERSION")?;
        } else if self.concurrency_token {
            write!(f, " CONCURRENCY")?;
        }
        Ok(())
    }
}

/// Index over one or more columns, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

impl fmt::Display for IndexDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "UNIQUE ")?;
        }
        write!(f, "{} ({})", self.name, self.columns.join(", "))
    }
}
