//! # Tienda Admin
//!
//! Operator CLI for the back office store.
//!
//! ## Usage
//! ```bash
//! tienda-admin migrate
//! tienda-admin check
//! tienda-admin seed --count 500
//! tienda-admin import-products productos.csv
//! tienda-admin close-day --date 2024-03-15
//! RUST_LOG=tienda_db=debug tienda-admin stats
//! ```
//!
//! Configuration comes from the environment (and `.env`), see [`config`].

mod commands;
mod config;
mod import;
mod seed;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tienda_db::Database;

use crate::config::AdminConfig;

#[derive(Parser)]
#[command(name = "tienda-admin")]
#[command(about = "Back office maintenance for the Tienda store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate,
    /// Test the database connection
    Check,
    /// Fill an empty store with sample data
    Seed {
        #[arg(long, default_value_t = 200)]
        count: usize,
    },
    /// Load products from a CSV sheet
    ImportProducts { path: PathBuf },
    /// Load suppliers from a CSV sheet
    ImportSuppliers { path: PathBuf },
    /// Link products to suppliers from a `codigo_producto,proveedor_nombre` sheet
    AssignSuppliers { path: PathBuf },
    /// Close a day (default: today, UTC)
    CloseDay {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print dashboard aggregates as JSON
    Stats,
    /// List products under a stock limit
    LowStock {
        #[arg(long, default_value_t = 5)]
        below: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let config = AdminConfig::load()?;
    if config.database_ssl {
        warn!("DATABASE_SSL is set but SQLite connections have no TLS; ignoring");
    }
    info!(db_url = %config.database_url, "Configuration loaded");

    // `migrate` and `check` must work against an unmigrated store.
    let run_migrations = !matches!(cli.command, Commands::Migrate | Commands::Check);
    let db = Database::new(config.to_db_config().run_migrations(run_migrations)).await?;

    let result = run(&db, cli.command).await;
    db.close().await;
    result
}

async fn run(db: &Database, command: Commands) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Migrate => commands::migrate(db, &mut out).await,
        Commands::Check => commands::check(db, &mut out).await,
        Commands::Seed { count } => {
            match seed::run(db, count, &mut rand::thread_rng()).await? {
                Some(report) => writeln!(
                    out,
                    "Seeded {} suppliers, {} products, {} combos",
                    report.suppliers, report.products, report.combos
                )?,
                None => writeln!(out, "Store already has products, nothing seeded")?,
            }
            Ok(())
        }
        Commands::ImportProducts { path } => {
            commands::import_products(db, open(&path)?, &mut out).await
        }
        Commands::ImportSuppliers { path } => {
            commands::import_suppliers(db, open(&path)?, &mut out).await
        }
        Commands::AssignSuppliers { path } => {
            commands::assign_suppliers(db, open(&path)?, &mut out).await
        }
        Commands::CloseDay { date } => commands::close_day(db, date, &mut out).await,
        Commands::Stats => commands::stats(db, &mut out).await,
        Commands::LowStock { below } => commands::low_stock(db, below, &mut out).await,
    }
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tienda_db=trace` - Trace the database layer only
/// - Default: INFO for tienda crates, WARN for sqlx
///
/// Logs go to stderr so command output can be piped.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tienda_db=info,tienda_admin=info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}
