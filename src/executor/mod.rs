pub mod ddl;
pub mod executor;
pub mod migration;

pub use executor::{OperationExecutor, OperationPipeline};
pub use migration::{MAX_COMMIT_ATTEMPTS, MigrationExecutor, MigrationState};
