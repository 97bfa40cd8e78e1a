pub mod plan;
pub mod planner;

pub use plan::{MigrationPlan, Target};
pub use planner::Planner;
