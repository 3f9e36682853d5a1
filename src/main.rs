//! RetailScope: three-stage analytics pipeline over retail transaction CSVs.
//!
//! This is the entrypoint that dispatches the clean, rfm and cohort stages,
//! wiring file I/O, reporting and timing around the library calls.

use anyhow::{bail, Result};
use clap::Parser;
use retailscope::cli::{self, Cli, Command};
use retailscope::{clean, cohort, io, report, rfm};
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Clean { input, output } => run_clean(&input, &output, cli.verbose),
        Command::Rfm {
            input,
            output,
            snapshot_date,
        } => run_rfm(&input, &output, snapshot_date.as_deref(), cli.verbose),
        Command::Cohort {
            input,
            counts,
            retention,
        } => run_cohort(&input, &counts, &retention, cli.verbose),
    }
}

/// Stage 1: raw transaction log -> cleaned table.
fn run_clean(input: &str, output: &str, verbose: bool) -> Result<()> {
    println!("=== Stage 1: Data Cleaning ===");
    let start = Instant::now();

    let df = io::read_table(Path::new(input))?;
    if verbose {
        println!("Loaded {} raw rows from: {}", df.height(), input);
    }

    let (mut cleaned, summary) = clean::clean_transactions(df)?;
    report::print_clean_summary(&summary);

    io::write_table(&mut cleaned, Path::new(output))?;
    println!("\n✓ Cleaned table saved to: {}", output);
    if verbose {
        println!("  Processing time: {:.2}s", start.elapsed().as_secs_f64());
    }
    Ok(())
}

/// Stage 2: cleaned table -> customer RFM table.
fn run_rfm(input: &str, output: &str, snapshot_date: Option<&str>, verbose: bool) -> Result<()> {
    println!("=== Stage 2: RFM Segmentation ===");
    let start = Instant::now();

    let df = load_cleaned(input)?;
    if verbose {
        println!("Loaded {} cleaned rows from: {}", df.height(), input);
    }

    let snapshot = match snapshot_date {
        Some(value) => Some(cli::parse_snapshot_date(value)?),
        None => rfm::snapshot_from(&df)?,
    };
    let records = match snapshot {
        Some(snapshot) => rfm::score_customers(&df, snapshot)?,
        None => {
            log::warn!("no dated rows in '{}'; writing an empty RFM table", input);
            Vec::new()
        }
    };
    report::print_rfm_summary(&records, snapshot);

    let mut frame = rfm::to_frame(&records)?;
    io::write_table(&mut frame, Path::new(output))?;
    println!("\n✓ RFM table saved to: {}", output);
    if verbose {
        println!("  Processing time: {:.2}s", start.elapsed().as_secs_f64());
    }
    Ok(())
}

/// Stage 3: cleaned table -> cohort count and retention matrices.
fn run_cohort(input: &str, counts: &str, retention: &str, verbose: bool) -> Result<()> {
    println!("=== Stage 3: Cohort Retention ===");
    let start = Instant::now();

    let df = load_cleaned(input)?;
    if verbose {
        println!("Loaded {} cleaned rows from: {}", df.height(), input);
    }

    let matrix = cohort::build_cohorts(&df)?;
    report::print_cohort_summary(&matrix);

    let mut counts_frame = matrix.counts_frame()?;
    io::write_table(&mut counts_frame, Path::new(counts))?;
    let mut retention_frame = matrix.retention_frame()?;
    io::write_table(&mut retention_frame, Path::new(retention))?;

    println!("\n✓ Cohort counts saved to: {}", counts);
    println!("✓ Retention matrix saved to: {}", retention);
    if verbose {
        println!("  Processing time: {:.2}s", start.elapsed().as_secs_f64());
    }
    Ok(())
}

/// Load a cleaned table produced by stage 1, parsing its invoice dates.
fn load_cleaned(input: &str) -> Result<polars::prelude::DataFrame> {
    if !Path::new(input).exists() {
        bail!(
            "cleaned table '{}' not found; run the clean stage first",
            input
        );
    }
    let df = io::read_table(Path::new(input))?;
    io::parse_invoice_dates(df)
}
