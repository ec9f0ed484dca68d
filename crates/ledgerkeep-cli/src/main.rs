mod banner;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ledgerkeep_config::{AppConfig, ConfigLoader, LoggingConfig};
use ledgerkeep_db::{
    Database, LedgerStats, LedgerStatsStore, MigrationDefinition, MigrationRecord,
    MigrationRegistry, MigrationReport, Migrator, Schema, ledger_stats,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ledgerkeep",
    version,
    about = "Ledger statistics store with embedded schema migrations"
)]
struct Cli {
    /// Path to a YAML or TOML config file
    #[arg(short, long, env = "LEDGERKEEP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (overrides logging.level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply every pending migration
    Migrate,
    /// Show applied and pending migrations
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Migrate, then create and update a sample ledger stats row
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new(cli.config.clone())
        .load()
        .context("failed to load configuration")?;
    init_tracing(&config.logging, cli.log_level.as_deref());

    let db = Database::connect(&config.database).context("failed to connect to database")?;
    let registry = registry(db.schema()).context("failed to register migrations")?;

    match cli.command {
        Command::Migrate => {
            let report = migrate(&db, &registry)?;
            banner::print_banner(&config, &report);
        }
        Command::Status { json } => status(&db, &registry, json)?,
        Command::Demo => demo(&config, &db, &registry)?,
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig, cli_level: Option<&str>) {
    let level = cli_level.unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Every entity module that owns tables contributes its migrations here.
fn registry(schema: &Schema) -> ledgerkeep_common::Result<MigrationRegistry> {
    MigrationRegistry::from_entities([ledger_stats::migrations(schema)])
}

fn migrate(db: &Database, registry: &MigrationRegistry) -> Result<MigrationReport> {
    let conn = db.connection()?;
    Migrator::new(db.schema())
        .run(&conn, registry)
        .context("database migration failed")
}

#[derive(Serialize)]
struct StatusReport<'a> {
    schema: &'a str,
    applied: Vec<MigrationRecord>,
    pending: Vec<&'a MigrationDefinition>,
}

fn status(db: &Database, registry: &MigrationRegistry, json: bool) -> Result<()> {
    let conn = db.connection()?;
    let migrator = Migrator::new(db.schema());
    let pending = migrator.pending(&conn, registry)?;
    let mut applied = migrator.history().list_all(&conn)?;
    applied.sort_by_key(|r| r.id);

    let report = StatusReport {
        schema: db.schema().name(),
        applied,
        pending,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("schema {}", report.schema);
    for record in &report.applied {
        println!(
            "  applied  {:<24} v{:<4} {}",
            record.entity,
            record.version,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    for definition in &report.pending {
        println!(
            "  pending  {:<24} v{:<4}",
            definition.entity,
            definition.version
        );
    }
    if report.pending.is_empty() {
        println!("up to date");
    }
    Ok(())
}

fn demo(config: &AppConfig, db: &Database, registry: &MigrationRegistry) -> Result<()> {
    let report = migrate(db, registry)?;
    banner::print_banner(config, &report);

    let conn = db.connection()?;
    let store = LedgerStatsStore::new(db.schema());

    let stats = match store.get_by_ledger_id(&conn, 11) {
        Ok(existing) => {
            info!("ledger stats for ledger 11 already exist, reusing them");
            existing
        }
        Err(e) if e.is_not_found() => {
            info!("inserting some ledger stats ...");
            let new_stats = LedgerStats {
                ledger_id: 11,
                last_insertion_at: Some(Utc::now()),
                active_sources: 111,
                number_of_entries: 1111,
                total_size_in_bytes: 1024,
                ..Default::default()
            };
            store
                .create(&conn, &new_stats)
                .with_context(|| format!("failed to create ledger stats: {new_stats:?}"))?
        }
        Err(e) => return Err(e).context("failed to look up ledger stats"),
    };
    info!("inserted ledger stats: {stats:?}");

    info!("updating ledger stats ...");
    let mut tampered = stats.clone();
    tampered.tampered = Some(Utc::now());
    let updated = store
        .update(&conn, &tampered)
        .with_context(|| format!("failed to update ledger stats: {tampered:?}"))?;
    info!("updated ledger stats: {updated:?}");

    println!("{}", serde_json::to_string_pretty(&updated)?);
    println!("\u{1f389} \u{1f973}");
    Ok(())
}
