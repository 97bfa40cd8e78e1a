pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rustmigrate")]
#[command(about = "Versioned schema migrations with a per-context history")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Connection string, e.g. rustmigrate://./data?context=BlogContext
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Directory holding the store snapshot and lock files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding one JSON file per migration
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Context key scoping the migration history
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Snapshot durability: sync, async or none
    #[arg(long, global = true)]
    pub durability: Option<String>,

    /// JSON file of reference rows upserted after reaching latest
    /// (`{"Table": [{"Column": value, ...}, ...]}`)
    #[arg(long, global = true)]
    pub seed_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Schema migration commands
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply migrations up to TARGET (default: latest)
    Up { target: Option<String> },
    /// Revert migrations down to TARGET (default: one step)
    Down { target: Option<String> },
    /// Show applied and pending migrations
    Status,
    /// Print the DDL a migration to TARGET would run, without running it
    Script { target: Option<String> },
    /// Scaffold an empty migration file
    Add { name: String },
}
