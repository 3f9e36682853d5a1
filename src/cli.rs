//! Command-line interface definitions and argument parsing

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};

/// Customer-behavior analytics over retail transaction logs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// The three pipeline stages. Each reads one table and writes the next;
/// `rfm` and `cohort` expect `clean` to have produced its output first.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate and filter the raw transaction log
    Clean {
        /// Path to the raw transaction CSV
        #[arg(short, long, default_value = "data/OnlineRetail.csv")]
        input: String,

        /// Output path for the cleaned table
        #[arg(short, long, default_value = "data/OnlineRetail_Clean.csv")]
        output: String,
    },

    /// Score customers and assign RFM segments
    Rfm {
        /// Path to the cleaned transaction CSV
        #[arg(short, long, default_value = "data/OnlineRetail_Clean.csv")]
        input: String,

        /// Output path for the customer RFM table
        #[arg(short, long, default_value = "rfm_segments.csv")]
        output: String,

        /// Reference date for recency (YYYY-MM-DD); defaults to the day
        /// after the newest invoice in the data
        #[arg(long)]
        snapshot_date: Option<String>,
    },

    /// Build the cohort count and retention matrices
    Cohort {
        /// Path to the cleaned transaction CSV
        #[arg(short, long, default_value = "data/OnlineRetail_Clean.csv")]
        input: String,

        /// Output path for the customer-count matrix
        #[arg(long, default_value = "cohort_counts.csv")]
        counts: String,

        /// Output path for the retention-rate matrix
        #[arg(long, default_value = "cohort_retention.csv")]
        retention: String,
    },
}

/// Parse a `--snapshot-date` value into a midnight timestamp.
/// Expected format: "YYYY-MM-DD"
pub fn parse_snapshot_date(value: &str) -> crate::Result<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid snapshot date '{}', expected YYYY-MM-DD", value))?;
    Ok(NaiveDateTime::new(date, NaiveTime::MIN))
}
