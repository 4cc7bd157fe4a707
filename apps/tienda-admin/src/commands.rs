//! Subcommand bodies.
//!
//! Each command takes an open [`Database`] and writes its human-readable
//! report to `out`; logging goes to stderr.

use std::io::{Read, Write};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use tracing::warn;

use tienda_core::{LowStockFilter, Money};
use tienda_db::migrations::migration_status;
use tienda_db::Database;

use crate::import;

pub async fn migrate(db: &Database, out: &mut impl Write) -> anyhow::Result<()> {
    db.run_migrations().await?;
    let (total, applied) = migration_status(db.pool()).await?;
    writeln!(out, "Migrations applied: {applied}/{total}")?;
    Ok(())
}

pub async fn check(db: &Database, out: &mut impl Write) -> anyhow::Result<()> {
    let now = db
        .server_time()
        .await
        .context("Database connection test failed")?;
    writeln!(out, "Connection OK, database time: {now}")?;
    Ok(())
}

pub async fn import_products(
    db: &Database,
    input: impl Read,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let products = import::read_products(input)?;
    let imported = db.products().import(&products).await?;
    writeln!(out, "Imported {imported} products")?;
    Ok(())
}

pub async fn import_suppliers(
    db: &Database,
    input: impl Read,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let suppliers = import::read_suppliers(input)?;
    let imported = db.suppliers().import(&suppliers).await?;
    writeln!(out, "Imported {imported} suppliers")?;
    Ok(())
}

pub async fn assign_suppliers(
    db: &Database,
    input: impl Read,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let pairs = import::read_supplier_assignments(input)?;
    let report = db.products().assign_suppliers(&pairs).await?;

    writeln!(out, "Updated {} products", report.updated)?;
    for name in &report.unknown_suppliers {
        writeln!(out, "  unknown supplier: {name}")?;
    }
    for code in &report.unknown_products {
        writeln!(out, "  unknown product code: {code}")?;
    }
    Ok(())
}

/// Closes `date`, or today (UTC) when not given.
pub async fn close_day(
    db: &Database,
    date: Option<NaiveDate>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());

    match db.day_closes().create(date).await? {
        Some(close) => {
            writeln!(out, "Day {date} closed")?;
            writeln!(out, "  sales:     {}", Money::from_cents(close.sales_total_cents))?;
            writeln!(out, "  purchases: {}", Money::from_cents(close.purchases_total_cents))?;
            writeln!(out, "  profit:    {}", Money::from_cents(close.profit_cents))?;
        }
        None => {
            warn!(date = %date, "Day close requested twice");
            writeln!(out, "Day {date} was already closed")?;
        }
    }
    Ok(())
}

pub async fn stats(db: &Database, out: &mut impl Write) -> anyhow::Result<()> {
    let stats = db.dashboard().stats().await?;
    serde_json::to_writer_pretty(&mut *out, &stats)?;
    writeln!(out)?;
    Ok(())
}

pub async fn low_stock(db: &Database, below: i64, out: &mut impl Write) -> anyhow::Result<()> {
    let products = db
        .products()
        .low_stock(LowStockFilter::Below { limit: below })
        .await?;

    if products.is_empty() {
        writeln!(out, "No products below {below} units")?;
        return Ok(());
    }
    for p in &products {
        writeln!(out, "{:>6}  {:<14}  {}", p.stock, p.code, p.name)?;
    }
    Ok(())
}
