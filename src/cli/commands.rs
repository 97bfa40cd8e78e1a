use super::{Cli, Command, GlobalArgs, MigrateAction};
use anyhow::{Context, Result};
use chrono::Utc;
use rustmigrate::catalog::{scaffold, write_to_dir};
use rustmigrate::{
    CancellationHandle, ClosureSeeder, Direction, MemoryStore, MigrateConfig, MigrationCatalog,
    MigrationReport, MigrationRunner, Row, SchemaState, Seeder, Target,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_DATA_DIR: &str = ".rustmigrate";

pub async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli.global)?;

    let Command::Migrate { action } = cli.command;
    match action {
        MigrateAction::Add { name } => add(&config, &name),
        MigrateAction::Status => status(&open_runner(&cli.global, config)?).await,
        MigrateAction::Script { target } => {
            let runner = open_runner(&cli.global, config)?;
            let target = parse_target(target.as_deref())?;
            let plan = runner.plan(&target).await?;
            print!("{}", plan.render_script());
            Ok(())
        }
        MigrateAction::Up { target } => {
            let runner = open_runner(&cli.global, config)?;
            let target = parse_target(target.as_deref())?;
            watch_interrupt(runner.cancellation().clone());
            let report = runner.migrate_toward(Direction::Up, &target).await?;
            print_report(&report);
            Ok(())
        }
        MigrateAction::Down { target } => {
            let runner = open_runner(&cli.global, config)?;
            let target = match target {
                Some(raw) => raw.parse()?,
                None => previous_target(&runner).await?,
            };
            watch_interrupt(runner.cancellation().clone());
            let report = runner.migrate_toward(Direction::Down, &target).await?;
            print_report(&report);
            Ok(())
        }
    }
}

fn build_config(global: &GlobalArgs) -> Result<MigrateConfig> {
    let mut config = match &global.url {
        Some(url) => MigrateConfig::from_url(url)?,
        None => MigrateConfig::default().data_dir(DEFAULT_DATA_DIR),
    };

    if let Some(dir) = &global.data_dir {
        config = config.data_dir(dir.clone());
    }
    if let Some(dir) = &global.migrations_dir {
        config = config.migrations_dir(dir.clone());
    }
    if let Some(context) = &global.context {
        config = config.context_key(context);
    }
    if let Some(durability) = &global.durability {
        config = config.durability(durability.parse()?);
    }

    config.validate()?;
    Ok(config)
}

fn open_runner(global: &GlobalArgs, config: MigrateConfig) -> Result<MigrationRunner<MemoryStore>> {
    let catalog = MigrationCatalog::load_dir(&config.migrations_dir)?;
    let store = match &config.data_dir {
        Some(dir) => MemoryStore::open(dir, config.durability)?,
        None => MemoryStore::new(),
    };
    tracing::debug!(
        migrations = catalog.len(),
        context = %config.context_key,
        "opened migration catalog"
    );

    let mut runner = MigrationRunner::new(catalog, Arc::new(store), config);
    if let Some(path) = &global.seed_file {
        runner = runner.with_seeder(json_seeder(path)?);
    }
    Ok(runner)
}

fn parse_target(raw: Option<&str>) -> Result<Target> {
    Ok(match raw {
        Some(raw) => raw.parse()?,
        None => Target::Latest,
    })
}

/// One step back from the most recent applied migration.
async fn previous_target(runner: &MigrationRunner<MemoryStore>) -> Result<Target> {
    let status = runner.status().await?;
    let applied = &status.applied;
    Ok(match applied.len() {
        0 | 1 => Target::Initial,
        n => Target::Id(applied[n - 2].id.clone()),
    })
}

fn watch_interrupt(cancellation: CancellationHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current migration");
            cancellation.cancel();
        }
    });
}

fn json_seeder(path: &Path) -> Result<impl Seeder + 'static> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;
    let tables: BTreeMap<String, Vec<Row>> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file '{}'", path.display()))?;

    Ok(ClosureSeeder::new(move |_schema: &SchemaState| {
        Ok(tables
            .iter()
            .flat_map(|(table, rows)| rows.iter().map(move |row| (table.clone(), row.clone())))
            .collect())
    }))
}

fn add(config: &MigrateConfig, name: &str) -> Result<()> {
    let definition = scaffold(name, Utc::now())?;
    let path = write_to_dir(&definition, &config.migrations_dir)?;
    println!("Created migration {} at {}", definition.id, path.display());
    Ok(())
}

async fn status(runner: &MigrationRunner<MemoryStore>) -> Result<()> {
    let status = runner.status().await?;

    println!("Context: {}", status.context_key);
    for record in &status.applied {
        println!(
            "  applied  {}  {}",
            record.id,
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    for id in &status.pending {
        println!("  pending  {}", id);
    }
    if let Some(reason) = &status.divergence {
        println!("History diverges from the catalog: {}", reason);
    } else if status.is_up_to_date() {
        println!("Schema is up to date.");
    }
    Ok(())
}

fn print_report(report: &MigrationReport) {
    if report.is_noop() {
        println!("Nothing to do for context {}.", report.context_key);
    } else {
        for id in &report.executed {
            println!("{:>5}  {}", report.direction.to_string(), id);
        }
        println!(
            "{} migration(s) {} for context {}.",
            report.executed.len(),
            match report.direction {
                Direction::Up => "applied",
                Direction::Down => "reverted",
            },
            report.context_key
        );
    }
    if report.seeded {
        println!("Seed data applied.");
    }
}
