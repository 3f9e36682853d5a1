//! Tabular source/sink collaborator.
//!
//! Every stage reads and writes delimited text tables through this module.
//! Raw exports from point-of-sale systems are frequently ISO-8859-1 rather
//! than UTF-8, so the loader decodes bytes itself before handing them to the
//! CSV parser. Schema validation and invoice-date parsing live here because
//! all three stages share them.

use crate::error::SchemaError;
use anyhow::Context;
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Columns a raw transaction log must provide.
pub const RAW_COLUMNS: [&str; 8] = [
    "InvoiceNo",
    "StockCode",
    "Description",
    "Quantity",
    "InvoiceDate",
    "UnitPrice",
    "CustomerID",
    "Country",
];

/// Read a delimited table, decoding ISO-8859-1 input when it is not UTF-8.
pub fn read_table(path: &Path) -> crate::Result<DataFrame> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let text = decode(bytes);

    let df = CsvReader::new(Cursor::new(text.into_bytes()))
        .has_header(true)
        .finish()
        .with_context(|| format!("failed to parse CSV from '{}'", path.display()))?;
    Ok(df)
}

/// Write a table as CSV, creating or truncating the target file.
pub fn write_table(df: &mut DataFrame, path: &Path) -> crate::Result<()> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    CsvWriter::new(&mut file)
        .finish(df)
        .with_context(|| format!("failed to write CSV to '{}'", path.display()))?;
    Ok(())
}

/// Fail with a [`SchemaError`] if any required column is absent.
pub fn ensure_columns(df: &DataFrame, required: &[&str]) -> Result<(), SchemaError> {
    for name in required {
        if !df.get_column_names().iter().any(|c| c == name) {
            return Err(SchemaError::MissingColumn {
                column: (*name).to_string(),
            });
        }
    }
    Ok(())
}

/// Parse the InvoiceDate column into Datetime(µs).
///
/// Parsing is non-strict: rows whose date cannot be read are excluded, not
/// errored. A column that is already a datetime passes through untouched.
pub fn parse_invoice_dates(df: DataFrame) -> crate::Result<DataFrame> {
    match df.column("InvoiceDate")?.dtype() {
        // Nothing to infer a date format from in an empty table.
        DataType::Utf8 if df.height() > 0 => {}
        _ => return Ok(df),
    }

    let df = df
        .lazy()
        .with_columns([col("InvoiceDate").str().strptime(
            DataType::Datetime(TimeUnit::Microseconds, None),
            StrptimeOptions {
                strict: false,
                ..Default::default()
            },
            lit("raise"),
        )])
        .drop_nulls(Some(vec![col("InvoiceDate")]))
        .collect()?;
    Ok(df)
}

/// Convert a Datetime(µs) cell into a naive timestamp.
pub fn datetime_from_micros(us: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp_micros(us).map(|dt| dt.naive_utc())
}

/// Convert a naive timestamp into a Datetime(µs) cell value.
pub fn micros_from_datetime(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_micros()
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        // ISO-8859-1: every byte is the Unicode code point of the same value.
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    }
}
