//! coursetime-reconcile - daily catch-up batch for missed aggregations
//!
//! Intended to run once per day from cron; re-offers every session that ended
//! the previous day to the aggregation engine. Already-aggregated sessions
//! are skipped, so re-runs are safe.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use coursetime_core::analytics::reconcile;
use coursetime_core::{Config, Database, StaticCatalog};

#[derive(Parser)]
#[command(name = "coursetime-reconcile")]
#[command(about = "Reconcile missed session aggregations for a calendar day")]
#[command(version)]
struct Args {
    /// Day to reconcile (YYYY-MM-DD); defaults to yesterday
    #[arg(short, long)]
    date: Option<NaiveDate>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        coursetime_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let catalog = match &config.catalog.path {
        Some(path) => StaticCatalog::load_from(path).context("failed to load catalog")?,
        None => StaticCatalog::new(),
    };

    tracing::info!(date = ?args.date, "Starting reconciliation");

    let report = match args.date {
        Some(date) => reconcile::run_for_date(&db, &catalog, date)?,
        None => reconcile::run_previous_day(&db, &catalog)?,
    };

    println!(
        "Reconciled: {} scanned, {} applied, {} skipped",
        report.scanned, report.applied, report.skipped
    );

    Ok(())
}
