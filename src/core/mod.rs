pub mod error;
pub mod operation;
pub mod types;

pub use error::{MigrationError, Result};
pub use operation::Operation;
pub use types::{ColumnDef, DataType, Direction, IndexDef, MIGRATION_TIMESTAMP_WIDTH, MigrationId};
