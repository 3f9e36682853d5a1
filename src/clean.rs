//! Stage 1: data-quality cleaning.
//!
//! Turns a raw transaction log into an analysis-ready table. Each rule is an
//! independent pass over the table; the two 99th-percentile outlier cuts are
//! deliberately sequential because the price threshold is computed on the
//! rows that survive the quantity cut.

use crate::{io, quantiles};
use chrono::NaiveDateTime;
use log::warn;
use polars::prelude::*;

/// Row counts after every cleaning rule, plus headline figures of the
/// cleaned table for reporting.
#[derive(Debug, Clone)]
pub struct CleanSummary {
    pub raw_rows: usize,
    pub after_missing: usize,
    pub after_dedup: usize,
    pub after_quantity: usize,
    pub after_price: usize,
    pub after_outliers: usize,
    pub final_rows: usize,
    pub customers: usize,
    pub revenue: f64,
    pub date_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl CleanSummary {
    pub fn is_empty(&self) -> bool {
        self.final_rows == 0
    }
}

/// Clean a raw transaction table.
///
/// Rules, in order:
/// 1. drop rows with a missing InvoiceDate or CustomerID
/// 2. drop exact full-row duplicates (first occurrence kept)
/// 3. drop returns and cancellations (Quantity <= 0)
/// 4. drop non-positive unit prices
/// 5. drop quantity outliers above the 99th percentile, then price outliers
///    above the 99th percentile of the remaining rows
/// 6. coerce CustomerID to integer and InvoiceDate to a timestamp; rows
///    whose date cannot be parsed are excluded
/// 7. derive TotalPrice = Quantity * UnitPrice
///
/// Fails only when a required column is absent. Every other anomaly is
/// filtered, not errored.
pub fn clean_transactions(df: DataFrame) -> crate::Result<(DataFrame, CleanSummary)> {
    io::ensure_columns(&df, &io::RAW_COLUMNS)?;
    let raw_rows = df.height();

    // 1. Rows without a customer or date cannot enter any analysis.
    let df = df
        .lazy()
        .drop_nulls(Some(vec![col("InvoiceDate"), col("CustomerID")]))
        .collect()?;
    let after_missing = df.height();

    // 2. Exact duplicates, first occurrence kept in table order.
    let df = df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    let after_dedup = df.height();

    // 3. Returns and cancellations carry non-positive quantities.
    let df = df.lazy().filter(col("Quantity").gt(0)).collect()?;
    let after_quantity = df.height();

    // 4. Zero or negative prices are data-entry noise.
    let df = df.lazy().filter(col("UnitPrice").gt(0.0)).collect()?;
    let after_price = df.height();

    // 5. Two sequential percentile cuts; the second threshold depends on
    //    the first filter's result, so they cannot be fused.
    let df = percentile_cut(df, "Quantity")?;
    let df = percentile_cut(df, "UnitPrice")?;
    let after_outliers = df.height();

    // 6. Types: integer customer ids, timestamp invoice dates.
    let df = io::parse_invoice_dates(df)?;
    let df = df
        .lazy()
        .with_columns([col("CustomerID").cast(DataType::Int64)])
        // 7. Derived per-row spend, always a float column.
        .with_columns([(col("Quantity") * col("UnitPrice"))
            .cast(DataType::Float64)
            .alias("TotalPrice")])
        .collect()?;

    let summary = summarize(&df, raw_rows, after_missing, after_dedup, after_quantity, after_price, after_outliers)?;
    if summary.is_empty() {
        warn!("cleaning removed every row; downstream stages will see an empty table");
    }
    Ok((df, summary))
}

/// Drop rows whose `column` value exceeds the 99th percentile of the values
/// currently in the table.
fn percentile_cut(df: DataFrame, column: &str) -> crate::Result<DataFrame> {
    let values: Vec<f64> = df
        .column(column)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_no_null_iter()
        .collect();

    let Some(threshold) = quantiles::percentile(&values, 0.99) else {
        return Ok(df);
    };
    let df = df
        .lazy()
        .filter(col(column).lt_eq(lit(threshold)))
        .collect()?;
    Ok(df)
}

fn summarize(
    df: &DataFrame,
    raw_rows: usize,
    after_missing: usize,
    after_dedup: usize,
    after_quantity: usize,
    after_price: usize,
    after_outliers: usize,
) -> crate::Result<CleanSummary> {
    let final_rows = df.height();
    let customers = if final_rows == 0 {
        0
    } else {
        df.column("CustomerID")?.n_unique()?
    };
    let revenue = if final_rows == 0 {
        0.0
    } else {
        df.column("TotalPrice")?.f64()?.sum().unwrap_or(0.0)
    };
    let date_range = if final_rows == 0 {
        None
    } else {
        let dates = df.column("InvoiceDate")?.datetime()?;
        match (dates.min(), dates.max()) {
            (Some(lo), Some(hi)) => {
                io::datetime_from_micros(lo).zip(io::datetime_from_micros(hi))
            }
            _ => None,
        }
    };

    Ok(CleanSummary {
        raw_rows,
        after_missing,
        after_dedup,
        after_quantity,
        after_price,
        after_outliers,
        final_rows,
        customers,
        revenue,
        date_range,
    })
}
