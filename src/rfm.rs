//! Stage 2: RFM segmentation.
//!
//! Aggregates cleaned transactions into per-customer Recency, Frequency and
//! Monetary metrics, buckets each metric into quartile scores, and assigns a
//! named segment through an ordered decision list.

use crate::io;
use crate::quantiles::{self, ScoreOrder};
use chrono::{Duration, NaiveDateTime};
use log::warn;
use polars::prelude::*;
use std::fmt;

/// Columns the scorer needs from a cleaned transaction table.
pub const REQUIRED_COLUMNS: [&str; 4] =
    ["InvoiceNo", "InvoiceDate", "CustomerID", "TotalPrice"];

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Behavioral segment a customer lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Champions,
    NewCustomers,
    CannotLoseThem,
    AtRisk,
    Lost,
    PotentialLoyalists,
}

impl Segment {
    pub const ALL: [Segment; 6] = [
        Segment::Champions,
        Segment::NewCustomers,
        Segment::CannotLoseThem,
        Segment::AtRisk,
        Segment::Lost,
        Segment::PotentialLoyalists,
    ];

    /// Ordered decision list over the three quartile scores; the first
    /// matching rule wins.
    ///
    /// A score of r == 2 with f < 3 and m < 3 matches no specific rule and
    /// falls through to [`Segment::PotentialLoyalists`].
    pub fn classify(r: u8, f: u8, m: u8) -> Segment {
        if r >= 3 && f >= 3 && m >= 3 {
            Segment::Champions
        } else if r >= 3 && f < 3 {
            Segment::NewCustomers
        } else if r < 2 && f >= 3 && m >= 3 {
            Segment::CannotLoseThem
        } else if r < 2 && f >= 3 && m < 3 {
            Segment::AtRisk
        } else if r < 2 && f < 2 {
            Segment::Lost
        } else {
            Segment::PotentialLoyalists
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::NewCustomers => "New Customers",
            Segment::CannotLoseThem => "Cannot Lose Them",
            Segment::AtRisk => "At Risk",
            Segment::Lost => "Lost",
            Segment::PotentialLoyalists => "Potential Loyalists",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One scored customer.
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRecord {
    pub customer_id: i64,
    /// Whole days from the latest purchase to the snapshot date.
    pub recency: i64,
    /// Distinct invoice count.
    pub frequency: i64,
    /// Sum of TotalPrice across all transactions.
    pub monetary: f64,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    pub segment: Segment,
}

/// Reference date for recency: one day past the newest invoice in the table.
///
/// Recomputed per run from the data, never hardcoded. `None` when the table
/// has no dated rows.
pub fn snapshot_from(df: &DataFrame) -> crate::Result<Option<NaiveDateTime>> {
    if df.height() == 0 {
        return Ok(None);
    }
    let max_us = df.column("InvoiceDate")?.datetime()?.max();
    Ok(max_us
        .and_then(io::datetime_from_micros)
        .map(|dt| dt + Duration::days(1)))
}

/// Score every customer in a cleaned transaction table.
///
/// The snapshot date is threaded in explicitly so runs are reproducible with
/// a fixed reference point; see [`snapshot_from`] for the data-derived
/// default. Returns one record per distinct customer, ascending by id.
pub fn score_customers(df: &DataFrame, snapshot: NaiveDateTime) -> crate::Result<Vec<RfmRecord>> {
    io::ensure_columns(df, &REQUIRED_COLUMNS)?;
    if df.height() == 0 {
        warn!("scoring an empty table; no customer records produced");
        return Ok(Vec::new());
    }

    // Per-customer aggregates. Ascending id fixes the "first seen" order
    // that breaks ties in the frequency and monetary ranks.
    let grouped = df
        .clone()
        .lazy()
        .with_columns([col("CustomerID").cast(DataType::Int64)])
        .group_by([col("CustomerID")])
        .agg([
            col("InvoiceDate").max().alias("LastPurchase"),
            col("InvoiceNo")
                .n_unique()
                .cast(DataType::Int64)
                .alias("Frequency"),
            col("TotalPrice").sum().alias("Monetary"),
        ])
        .sort("CustomerID", SortOptions::default())
        .collect()?;

    let ids: Vec<i64> = grouped
        .column("CustomerID")?
        .i64()?
        .into_no_null_iter()
        .collect();
    let last_purchase: Vec<i64> = grouped
        .column("LastPurchase")?
        .datetime()?
        .into_no_null_iter()
        .collect();
    let frequency: Vec<i64> = grouped
        .column("Frequency")?
        .i64()?
        .into_no_null_iter()
        .collect();
    let monetary: Vec<f64> = grouped
        .column("Monetary")?
        .f64()?
        .into_no_null_iter()
        .collect();

    let snapshot_us = io::micros_from_datetime(snapshot);
    let recency: Vec<i64> = last_purchase
        .iter()
        .map(|&us| ((snapshot_us - us) / MICROS_PER_DAY).max(0))
        .collect();

    // Recency is cut on the raw values with the score inverted: the most
    // recent quartile scores highest. Frequency and monetary are ranked
    // first (stable, first-seen ties) and the ranks are cut ascending.
    let recency_values: Vec<f64> = recency.iter().map(|&d| d as f64).collect();
    let r_scores = quantiles::quartile_scores(&recency_values, ScoreOrder::Descending);

    let frequency_values: Vec<f64> = frequency.iter().map(|&n| n as f64).collect();
    let f_scores = quantiles::quartile_scores(
        &quantiles::first_seen_ranks(&frequency_values),
        ScoreOrder::Ascending,
    );
    let m_scores = quantiles::quartile_scores(
        &quantiles::first_seen_ranks(&monetary),
        ScoreOrder::Ascending,
    );

    let records = ids
        .into_iter()
        .enumerate()
        .map(|(i, customer_id)| {
            let (r, f, m) = (r_scores[i], f_scores[i], m_scores[i]);
            RfmRecord {
                customer_id,
                recency: recency[i],
                frequency: frequency[i],
                monetary: monetary[i],
                r_score: r,
                f_score: f,
                m_score: m,
                segment: Segment::classify(r, f, m),
            }
        })
        .collect();
    Ok(records)
}

/// Lay scored customers out as the output table:
/// CustomerID, Recency, Frequency, Monetary, R_Score, F_Score, M_Score, Segment.
pub fn to_frame(records: &[RfmRecord]) -> crate::Result<DataFrame> {
    let df = df!(
        "CustomerID" => records.iter().map(|r| r.customer_id).collect::<Vec<_>>(),
        "Recency" => records.iter().map(|r| r.recency).collect::<Vec<_>>(),
        "Frequency" => records.iter().map(|r| r.frequency).collect::<Vec<_>>(),
        "Monetary" => records.iter().map(|r| r.monetary).collect::<Vec<_>>(),
        "R_Score" => records.iter().map(|r| r.r_score as i64).collect::<Vec<_>>(),
        "F_Score" => records.iter().map(|r| r.f_score as i64).collect::<Vec<_>>(),
        "M_Score" => records.iter().map(|r| r.m_score as i64).collect::<Vec<_>>(),
        "Segment" => records.iter().map(|r| r.segment.to_string()).collect::<Vec<_>>(),
    )?;
    Ok(df)
}
