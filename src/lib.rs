//! RetailScope: customer-behavior analytics over retail transaction logs
//!
//! This library implements a three-stage batch pipeline: data-quality
//! cleaning, RFM (Recency/Frequency/Monetary) segmentation, and cohort-based
//! retention analysis. Each stage consumes a CSV table, derives a new table,
//! and writes it back alongside a console report.

pub mod clean;
pub mod cli;
pub mod cohort;
pub mod error;
pub mod io;
pub mod quantiles;
pub mod report;
pub mod rfm;

// Re-export public items for easier access
pub use clean::{clean_transactions, CleanSummary};
pub use cli::Cli;
pub use cohort::{build_cohorts, CohortMatrix, CohortMonth};
pub use error::SchemaError;
pub use rfm::{score_customers, snapshot_from, RfmRecord, Segment};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
