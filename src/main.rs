//! loan-metrics CLI
//!
//! Recompute loan state and run metric aggregation from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Ingest a ledger file and show derived loan state
//! loan-metrics recalc --input ledger.json --as-of 2025-06-30
//!
//! # Run one aggregation pass and print officer/branch snapshots
//! loan-metrics aggregate --input ledger.json --date 2025-06-30 --config engine.toml
//!
//! # Output as JSON
//! loan-metrics aggregate --input ledger.json --date 2025-06-30 --format json
//!
//! # Generate a synthetic ledger for testing
//! loan-metrics generate --officers 10 --loans-per-officer 25 --seed 7
//! ```

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use loan_metrics_engine::aggregation::portfolio::PortfolioSummary;
use loan_metrics_engine::aggregation::scheduler::{
    AggregationError, AggregationRun, AggregationScheduler,
};
use loan_metrics_engine::config::{ConfigError, EngineConfig};
use loan_metrics_engine::engine::recalc::RecalculationEngine;
use loan_metrics_engine::ledger::clock::FixedClock;
use loan_metrics_engine::ledger::ingest::{BatchReport, LedgerBatch};
use loan_metrics_engine::ledger::store::{LedgerStore, LoanView};
use loan_metrics_engine::simulation::portfolio_gen::{generate_portfolio, PortfolioConfig};
use loan_metrics_engine::snapshot::store::{
    BranchMetricSnapshot, OfficerMetricSnapshot, SnapshotStore,
};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "loan-metrics", version, about = "Loan metrics computation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a ledger file and print the derived state of every loan
    Recalc {
        #[arg(long)]
        input: PathBuf,
        /// Recompute as of this date instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Ingest a ledger file and run one aggregation pass for a date
    Aggregate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Generate a synthetic ledger file
    Generate {
        #[arg(long, default_value_t = 10)]
        officers: usize,
        #[arg(long, default_value_t = 20)]
        loans_per_officer: usize,
        /// Last day repayments may fall on; defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        seed: Option<u64>,
        /// Write to file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("error reading '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error writing '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing ledger JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// JSON output of `recalc`.
#[derive(serde::Serialize)]
struct RecalcOutput<'a> {
    report: &'a BatchReport,
    loans: &'a [LoanView],
}

/// JSON output of `aggregate`.
#[derive(serde::Serialize)]
struct AggregateOutput<'a> {
    report: &'a BatchReport,
    run: &'a AggregationRun,
    officers: &'a [OfficerMetricSnapshot],
    branches: &'a [BranchMetricSnapshot],
    portfolio: &'a PortfolioSummary,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn load_batch(path: &Path) -> Result<LedgerBatch, CliError> {
    let content = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn open_ledger(config: &EngineConfig, as_of: Option<NaiveDate>) -> LedgerStore {
    let engine = RecalculationEngine::new(config.grace_period_days);
    match as_of {
        Some(date) => LedgerStore::with_clock(engine, Arc::new(FixedClock::at_date(date))),
        None => LedgerStore::new(engine),
    }
}

fn cmd_recalc(
    input: &Path,
    as_of: Option<NaiveDate>,
    config: Option<&Path>,
    format: Format,
) -> Result<(), CliError> {
    let config = load_config(config)?;
    let ledger = open_ledger(&config, as_of);
    let report = ledger.ingest_batch(load_batch(input)?);
    info!("ingested {} records from {}", report.processed, input.display());

    let loans = ledger.loan_views();
    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&RecalcOutput {
                report: &report,
                loans: &loans,
            })?
        ),
        Format::Text => {
            println!("{}", report);
            for view in &loans {
                println!(
                    "--- {} ({}, {}) ---",
                    view.loan.id, view.loan.officer_id, view.loan.status
                );
                println!("{}", view.derived);
            }
        }
    }
    Ok(())
}

fn cmd_aggregate(
    input: &Path,
    date: NaiveDate,
    config: Option<&Path>,
    format: Format,
) -> Result<(), CliError> {
    let config = load_config(config)?;
    let ledger = Arc::new(open_ledger(&config, Some(date)));
    let report = ledger.ingest_batch(load_batch(input)?);

    let snapshots = Arc::new(SnapshotStore::new());
    let scheduler = AggregationScheduler::new(ledger, snapshots.clone(), config);
    let run = scheduler.run(date)?;
    let officers = snapshots.officer_snapshots_on(date);
    let branches = snapshots.branch_snapshots_on(date);
    let portfolio = scheduler.portfolio_summary(date);

    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&AggregateOutput {
                report: &report,
                run: &run,
                officers: &officers,
                branches: &branches,
                portfolio: &portfolio,
            })?
        ),
        Format::Text => {
            println!("{}", report);
            println!("{}", run);
            println!("=== Officers ===");
            for s in &officers {
                print!(
                    "{:<10} {:<8} FIMR {:<8} Slip {:<8} Roll {:<8} ",
                    s.officer_id, s.branch_id, s.metrics.fimr, s.metrics.slippage, s.metrics.roll
                );
                println!(
                    "AYR {:<8} DQI {:<6} Risk {:>6} [{}]",
                    s.metrics.ayr, s.metrics.dqi, s.metrics.risk_score, s.metrics.bands.risk
                );
            }
            println!("\n=== Branches ===");
            for s in &branches {
                println!("--- {} ({} officers) ---", s.branch_id, s.officer_count);
                println!("{}", s.metrics);
            }
            println!("{}", portfolio);
        }
    }
    Ok(())
}

fn cmd_generate(
    officers: usize,
    loans_per_officer: usize,
    as_of: Option<NaiveDate>,
    seed: Option<u64>,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let mut config = PortfolioConfig {
        officer_count: officers,
        loans_per_officer,
        seed,
        ..Default::default()
    };
    if let Some(date) = as_of {
        config.as_of = date;
    }
    let batch = generate_portfolio(&config);
    let json = serde_json::to_string_pretty(&batch)?;

    match output {
        Some(path) => {
            fs::write(path, &json).map_err(|source| CliError::Write {
                path: path.display().to_string(),
                source,
            })?;
            eprintln!(
                "Generated {} loans and {} repayments across {} officers → {}",
                batch.loans.len(),
                batch.repayments.len(),
                batch.officers.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Recalc {
            input,
            as_of,
            config,
            format,
        } => cmd_recalc(input, *as_of, config.as_deref(), *format),
        Command::Aggregate {
            input,
            date,
            config,
            format,
        } => cmd_aggregate(input, *date, config.as_deref(), *format),
        Command::Generate {
            officers,
            loans_per_officer,
            as_of,
            seed,
            output,
        } => cmd_generate(*officers, *loans_per_officer, *as_of, *seed, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
