//! Stage 3: cohort-based retention analysis.
//!
//! Groups customers by the calendar month of their first purchase and tracks
//! how many of them are still transacting at each whole-month offset. The
//! matrices are `Array2` cells alongside a separate row-label vector; a cell
//! is `None` when that (cohort, offset) pair was never observed, which is
//! distinct from an observed zero.

use crate::io;
use chrono::{Datelike, NaiveDateTime};
use log::warn;
use ndarray::Array2;
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Columns the cohort builder needs from a cleaned transaction table.
pub const REQUIRED_COLUMNS: [&str; 2] = ["InvoiceDate", "CustomerID"];

/// Calendar month at year + month granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CohortMonth {
    pub year: i32,
    pub month: u32,
}

impl CohortMonth {
    pub fn of(dt: NaiveDateTime) -> CohortMonth {
        CohortMonth {
            year: dt.year(),
            month: dt.month(),
        }
    }

    /// Whole calendar months elapsed since `earlier`.
    pub fn months_since(&self, earlier: CohortMonth) -> i64 {
        (self.year as i64 * 12 + self.month as i64)
            - (earlier.year as i64 * 12 + earlier.month as i64)
    }
}

impl fmt::Display for CohortMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Distinct-customer activity per cohort and month offset, with the derived
/// retention percentages.
#[derive(Debug)]
pub struct CohortMatrix {
    /// Row labels, ascending cohort month.
    pub months: Vec<CohortMonth>,
    /// Distinct customers active at (cohort row, month offset).
    pub counts: Array2<Option<i64>>,
    /// 100 x count / cohort size, rounded to one decimal. Offset 0 is
    /// exactly 100.0 for every observed cohort.
    pub retention: Array2<Option<f64>>,
}

impl CohortMatrix {
    pub fn n_cohorts(&self) -> usize {
        self.months.len()
    }

    /// Number of observed month offsets (columns).
    pub fn n_periods(&self) -> usize {
        self.counts.ncols()
    }

    /// Size of each cohort in its first month.
    pub fn cohort_sizes(&self) -> Vec<(CohortMonth, i64)> {
        self.months
            .iter()
            .enumerate()
            .filter_map(|(row, &month)| self.counts[[row, 0]].map(|n| (month, n)))
            .collect()
    }

    /// Mean retention over the cohorts observed at `offset`.
    pub fn mean_retention(&self, offset: usize) -> Option<f64> {
        if offset >= self.n_periods() {
            return None;
        }
        let observed: Vec<f64> = (0..self.n_cohorts())
            .filter_map(|row| self.retention[[row, offset]])
            .collect();
        if observed.is_empty() {
            return None;
        }
        Some(observed.iter().sum::<f64>() / observed.len() as f64)
    }

    /// Count matrix as a table: CohortMonth plus one column per offset.
    /// Unobserved cells stay empty.
    pub fn counts_frame(&self) -> crate::Result<DataFrame> {
        let mut columns = vec![Series::new(
            "CohortMonth",
            self.months.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        )];
        for offset in 0..self.n_periods() {
            let cells: Vec<Option<i64>> = (0..self.n_cohorts())
                .map(|row| self.counts[[row, offset]])
                .collect();
            columns.push(Series::new(&offset.to_string(), cells));
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Retention matrix as a table, same shape as [`CohortMatrix::counts_frame`].
    pub fn retention_frame(&self) -> crate::Result<DataFrame> {
        let mut columns = vec![Series::new(
            "CohortMonth",
            self.months.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        )];
        for offset in 0..self.n_periods() {
            let cells: Vec<Option<f64>> = (0..self.n_cohorts())
                .map(|row| self.retention[[row, offset]])
                .collect();
            columns.push(Series::new(&offset.to_string(), cells));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Build the cohort count and retention matrices from a cleaned table.
///
/// A customer's cohort is the month of their earliest transaction over the
/// whole table, independent of any scoring snapshot. Rows without a usable
/// customer id or date are excluded, never errored.
pub fn build_cohorts(df: &DataFrame) -> crate::Result<CohortMatrix> {
    io::ensure_columns(df, &REQUIRED_COLUMNS)?;

    let mut rows: Vec<(i64, CohortMonth)> = Vec::with_capacity(df.height());
    if df.height() > 0 {
        let ids = df.column("CustomerID")?.cast(&DataType::Int64)?;
        let ids = ids.i64()?;
        let dates = df.column("InvoiceDate")?.datetime()?;
        for (id, us) in ids.into_iter().zip(dates.into_iter()) {
            if let (Some(id), Some(dt)) = (id, us.and_then(io::datetime_from_micros)) {
                rows.push((id, CohortMonth::of(dt)));
            }
        }
    }
    if rows.is_empty() {
        warn!("no usable rows for cohort analysis; matrices will be empty");
        return Ok(CohortMatrix {
            months: Vec::new(),
            counts: Array2::from_elem((0, 0), None),
            retention: Array2::from_elem((0, 0), None),
        });
    }

    // First-purchase month per customer, over the entire table.
    let mut first: HashMap<i64, CohortMonth> = HashMap::new();
    for &(id, month) in &rows {
        first
            .entry(id)
            .and_modify(|m| {
                if month < *m {
                    *m = month;
                }
            })
            .or_insert(month);
    }

    // Distinct customers active at each (cohort, offset) pair.
    let mut active: BTreeMap<CohortMonth, BTreeMap<usize, HashSet<i64>>> = BTreeMap::new();
    for &(id, month) in &rows {
        let Some(&cohort) = first.get(&id) else {
            continue;
        };
        let offset = month.months_since(cohort);
        if offset < 0 {
            // Unreachable when `first` holds the minimum; excluded, not fatal.
            continue;
        }
        active
            .entry(cohort)
            .or_default()
            .entry(offset as usize)
            .or_default()
            .insert(id);
    }

    let months: Vec<CohortMonth> = active.keys().copied().collect();
    let n_periods = active
        .values()
        .flat_map(|offsets| offsets.keys())
        .max()
        .map_or(0, |&last| last + 1);

    let mut counts = Array2::from_elem((months.len(), n_periods), None);
    for (row, month) in months.iter().enumerate() {
        for (&offset, customers) in &active[month] {
            counts[[row, offset]] = Some(customers.len() as i64);
        }
    }

    let mut retention = Array2::from_elem(counts.dim(), None);
    for row in 0..months.len() {
        let Some(base) = counts[[row, 0]] else {
            continue; // every cohort is active in its own first month
        };
        for offset in 0..n_periods {
            if let Some(n) = counts[[row, offset]] {
                retention[[row, offset]] = Some(round1(100.0 * n as f64 / base as f64));
            }
        }
    }

    Ok(CohortMatrix {
        months,
        counts,
        retention,
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned_frame(rows: &[(i64, &str)]) -> DataFrame {
        let df = df!(
            "CustomerID" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "InvoiceDate" => rows.iter().map(|r| r.1.to_string()).collect::<Vec<_>>(),
        )
        .unwrap();
        io::parse_invoice_dates(df).unwrap()
    }

    #[test]
    fn test_months_since_crosses_year_boundaries() {
        let nov = CohortMonth {
            year: 2010,
            month: 11,
        };
        let feb = CohortMonth {
            year: 2011,
            month: 2,
        };
        assert_eq!(feb.months_since(nov), 3);
        assert_eq!(nov.months_since(nov), 0);
        assert_eq!(nov.months_since(feb), -3);
    }

    #[test]
    fn test_cohort_month_display() {
        let month = CohortMonth {
            year: 2010,
            month: 3,
        };
        assert_eq!(month.to_string(), "2010-03");
    }

    #[test]
    fn test_two_customer_scenario() {
        // Customer 1 buys in Dec, Jan and twice in Mar; customer 2 only in Dec.
        let df = cleaned_frame(&[
            (1, "2010-12-01T08:00:00"),
            (1, "2010-12-15T09:00:00"),
            (1, "2011-01-10T10:00:00"),
            (1, "2011-03-02T11:00:00"),
            (1, "2011-03-20T12:00:00"),
            (2, "2010-12-05T13:00:00"),
        ]);

        let matrix = build_cohorts(&df).unwrap();
        let dec = CohortMonth {
            year: 2010,
            month: 12,
        };
        assert_eq!(matrix.months, vec![dec]);
        assert_eq!(matrix.n_periods(), 4);

        assert_eq!(matrix.counts[[0, 0]], Some(2));
        assert_eq!(matrix.counts[[0, 1]], Some(1));
        assert_eq!(matrix.counts[[0, 2]], None); // February never observed
        assert_eq!(matrix.counts[[0, 3]], Some(1));

        assert_eq!(matrix.retention[[0, 0]], Some(100.0));
        assert_eq!(matrix.retention[[0, 1]], Some(50.0));
        assert_eq!(matrix.retention[[0, 2]], None);
        assert_eq!(matrix.retention[[0, 3]], Some(50.0));
    }

    #[test]
    fn test_single_month_dataset_has_one_column() {
        let df = cleaned_frame(&[
            (1, "2011-05-01T08:00:00"),
            (2, "2011-05-12T09:00:00"),
            (3, "2011-05-30T10:00:00"),
        ]);

        let matrix = build_cohorts(&df).unwrap();
        assert_eq!(matrix.n_cohorts(), 1);
        assert_eq!(matrix.n_periods(), 1);
        assert_eq!(matrix.counts[[0, 0]], Some(3));
        assert_eq!(matrix.retention[[0, 0]], Some(100.0));
    }

    #[test]
    fn test_single_customer_cohort_is_valid() {
        let df = cleaned_frame(&[
            (1, "2011-01-05T08:00:00"),
            (2, "2011-02-03T09:00:00"),
            (2, "2011-04-07T10:00:00"),
        ]);

        let matrix = build_cohorts(&df).unwrap();
        assert_eq!(matrix.n_cohorts(), 2);

        let jan_row = 0;
        assert_eq!(matrix.counts[[jan_row, 0]], Some(1));
        assert_eq!(matrix.retention[[jan_row, 0]], Some(100.0));

        let feb_row = 1;
        assert_eq!(matrix.counts[[feb_row, 0]], Some(1));
        assert_eq!(matrix.counts[[feb_row, 2]], Some(1));
        assert_eq!(matrix.retention[[feb_row, 2]], Some(100.0));
    }

    #[test]
    fn test_counts_never_exceed_cohort_size() {
        let df = cleaned_frame(&[
            (1, "2010-12-01T08:00:00"),
            (2, "2010-12-02T08:00:00"),
            (3, "2010-12-03T08:00:00"),
            (1, "2011-01-04T08:00:00"),
            (2, "2011-01-05T08:00:00"),
            (1, "2011-02-06T08:00:00"),
        ]);

        let matrix = build_cohorts(&df).unwrap();
        for row in 0..matrix.n_cohorts() {
            let base = matrix.counts[[row, 0]].unwrap();
            for offset in 0..matrix.n_periods() {
                if let Some(n) = matrix.counts[[row, offset]] {
                    assert!(n <= base);
                }
                if let Some(rate) = matrix.retention[[row, offset]] {
                    assert!(rate >= 0.0 && rate <= 100.0);
                }
            }
        }
    }

    #[test]
    fn test_retention_rounds_to_one_decimal() {
        // Three customers in the cohort, one returns: 33.333... -> 33.3.
        let df = cleaned_frame(&[
            (1, "2010-12-01T08:00:00"),
            (2, "2010-12-02T08:00:00"),
            (3, "2010-12-03T08:00:00"),
            (1, "2011-01-04T08:00:00"),
        ]);

        let matrix = build_cohorts(&df).unwrap();
        assert_eq!(matrix.retention[[0, 1]], Some(33.3));
    }

    #[test]
    fn test_matrix_frames_have_offset_columns() {
        let df = cleaned_frame(&[
            (1, "2010-12-01T08:00:00"),
            (1, "2011-01-04T08:00:00"),
        ]);

        let matrix = build_cohorts(&df).unwrap();
        let counts = matrix.counts_frame().unwrap();
        assert_eq!(counts.get_column_names(), &["CohortMonth", "0", "1"]);

        let retention = matrix.retention_frame().unwrap();
        assert_eq!(retention.height(), 1);
        let first = retention.column("0").unwrap().f64().unwrap().get(0);
        assert_eq!(first, Some(100.0));
    }

    #[test]
    fn test_empty_table_yields_empty_matrix() {
        let df = cleaned_frame(&[]);
        let matrix = build_cohorts(&df).unwrap();
        assert_eq!(matrix.n_cohorts(), 0);
        assert_eq!(matrix.n_periods(), 0);
        assert!(matrix.cohort_sizes().is_empty());
        assert_eq!(matrix.mean_retention(0), None);
    }

    #[test]
    fn test_mean_retention_ignores_unobserved_cells() {
        // Dec cohort retains 50% at offset 1; Jan cohort is unobserved there.
        let df = cleaned_frame(&[
            (1, "2010-12-01T08:00:00"),
            (2, "2010-12-02T08:00:00"),
            (1, "2011-01-03T08:00:00"),
            (3, "2011-01-05T08:00:00"),
        ]);

        let matrix = build_cohorts(&df).unwrap();
        assert_eq!(matrix.mean_retention(0), Some(100.0));
        assert_eq!(matrix.mean_retention(1), Some(50.0));
        assert_eq!(matrix.mean_retention(7), None);
    }
}
