mod cli;

use clap::Parser;
use cli::Cli;
use rustmigrate::MigrationError;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match cli::commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<MigrationError>() {
            Some(migration_err) => {
                eprintln!("{}: {}", migration_err.kind(), err);
                ExitCode::from(migration_err.exit_code() as u8)
            }
            None => {
                eprintln!("Error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rustmigrate=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
