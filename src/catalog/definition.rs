use crate::core::{Direction, MigrationId, Operation};
use serde::{Deserialize, Serialize};

/// One authored, reversible unit of schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDefinition {
    pub id: MigrationId,
    #[serde(default)]
    pub up: Vec<Operation>,
    #[serde(default)]
    pub down: Vec<Operation>,
}

impl MigrationDefinition {
    pub fn new(id: MigrationId) -> Self {
        Self {
            id,
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Append an operation to the `up` script.
    pub fn up(mut self, operation: Operation) -> Self {
        self.up.push(operation);
        self
    }

    /// Append an operation to the `down` script.
    pub fn down(mut self, operation: Operation) -> Self {
        self.down.push(operation);
        self
    }

    pub fn operations(&self, direction: Direction) -> &[Operation] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}
