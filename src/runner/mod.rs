pub mod cancel;
pub mod runner;
pub mod seed;

pub use cancel::CancellationHandle;
pub use runner::{MigrationReport, MigrationRunner, MigrationStatus};
pub use seed::{ClosureSeeder, SeedSession, Seeder};
