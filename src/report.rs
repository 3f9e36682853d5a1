//! Console reports for each pipeline stage.

use crate::clean::CleanSummary;
use crate::cohort::CohortMatrix;
use crate::rfm::{RfmRecord, Segment};
use chrono::NaiveDateTime;

/// Print the per-rule row counts and headline figures of a cleaning run.
pub fn print_clean_summary(summary: &CleanSummary) {
    println!("\n=== Data Quality Report ===");
    println!("Raw rows: {}", summary.raw_rows);
    println!(
        "✓ After dropping missing CustomerID/InvoiceDate: {}",
        summary.after_missing
    );
    println!("✓ After dropping exact duplicates: {}", summary.after_dedup);
    println!(
        "✓ After dropping returns (Quantity <= 0): {}",
        summary.after_quantity
    );
    println!(
        "✓ After dropping non-positive prices: {}",
        summary.after_price
    );
    println!(
        "✓ After 99th-percentile outlier cuts: {}",
        summary.after_outliers
    );
    println!("✓ Final cleaned rows: {}", summary.final_rows);

    if summary.is_empty() {
        println!("\nNo rows survived cleaning; downstream tables will be empty.");
        return;
    }

    println!("\nUnique customers: {}", summary.customers);
    println!("Total revenue: ${:.2}", summary.revenue);
    if let Some((from, to)) = summary.date_range {
        println!("Date range: {} to {}", from, to);
    }
}

/// Print metric ranges, the segment distribution and revenue concentration.
pub fn print_rfm_summary(records: &[RfmRecord], snapshot: Option<NaiveDateTime>) {
    println!("\n=== RFM Summary ===");
    if let Some(snapshot) = snapshot {
        println!("Snapshot date: {}", snapshot.date());
    }
    println!("Customers scored: {}", records.len());
    if records.is_empty() {
        return;
    }

    let recency: Vec<f64> = records.iter().map(|r| r.recency as f64).collect();
    let frequency: Vec<f64> = records.iter().map(|r| r.frequency as f64).collect();
    let monetary: Vec<f64> = records.iter().map(|r| r.monetary).collect();
    print_metric("Recency (days)", &recency);
    print_metric("Frequency", &frequency);
    print_metric("Monetary", &monetary);

    println!("\nSegment distribution:");
    println!("  Segment             | Count | Revenue      | Avg Revenue | Avg Orders");
    println!("  --------------------|-------|--------------|-------------|-----------");
    for segment in Segment::ALL {
        let members: Vec<&RfmRecord> =
            records.iter().filter(|r| r.segment == segment).collect();
        if members.is_empty() {
            continue;
        }
        let count = members.len();
        let revenue: f64 = members.iter().map(|r| r.monetary).sum();
        let orders: i64 = members.iter().map(|r| r.frequency).sum();
        println!(
            "  {:19} | {:5} | {:12.2} | {:11.2} | {:10.2}",
            segment.label(),
            count,
            revenue,
            revenue / count as f64,
            orders as f64 / count as f64,
        );
    }

    if let Some(share) = revenue_concentration(records, 0.2) {
        println!("\nTop 20% of customers drive {:.1}% of revenue", share);
    }
}

/// Print cohort sizes and average retention by month offset.
pub fn print_cohort_summary(matrix: &CohortMatrix) {
    println!("\n=== Cohort Summary ===");
    println!(
        "Cohorts: {}, month offsets observed: {}",
        matrix.n_cohorts(),
        matrix.n_periods()
    );
    if matrix.n_cohorts() == 0 {
        return;
    }

    println!("\nCohort sizes (first month):");
    for (month, size) in matrix.cohort_sizes() {
        println!("  {}: {} customers", month, size);
    }

    println!("\nAverage retention by month offset:");
    for offset in 0..matrix.n_periods().min(6) {
        if let Some(rate) = matrix.mean_retention(offset) {
            println!("  Month {}: {:.1}%", offset, rate);
        }
    }

    if let Some(repeat) = matrix.mean_retention(1) {
        println!("\nRepeat purchase rate (month 1): {:.1}%", repeat);
    }
}

/// Share of total revenue carried by the top `share` fraction of customers,
/// ranked by monetary value. `None` when the table is empty or revenue-free.
pub fn revenue_concentration(records: &[RfmRecord], share: f64) -> Option<f64> {
    let total: f64 = records.iter().map(|r| r.monetary).sum();
    if records.is_empty() || total <= 0.0 {
        return None;
    }

    let mut by_monetary: Vec<f64> = records.iter().map(|r| r.monetary).collect();
    by_monetary.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let top_n = (records.len() as f64 * share) as usize;
    let top: f64 = by_monetary.iter().take(top_n).sum();
    Some(top / total * 100.0)
}

fn print_metric(name: &str, values: &[f64]) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    println!("{}: min={:.2}, max={:.2}, avg={:.2}", name, min, max, mean);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(customer_id: i64, monetary: f64) -> RfmRecord {
        RfmRecord {
            customer_id,
            recency: 10,
            frequency: 2,
            monetary,
            r_score: 2,
            f_score: 2,
            m_score: 2,
            segment: Segment::PotentialLoyalists,
        }
    }

    #[test]
    fn test_revenue_concentration_top_share() {
        let records: Vec<RfmRecord> = vec![
            record(1, 800.0),
            record(2, 100.0),
            record(3, 50.0),
            record(4, 30.0),
            record(5, 20.0),
        ];

        // Top 20% of 5 customers is the single biggest spender.
        let share = revenue_concentration(&records, 0.2).unwrap();
        assert!((share - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_revenue_concentration_empty_or_zero() {
        assert_eq!(revenue_concentration(&[], 0.2), None);

        let zero = vec![record(1, 0.0), record(2, 0.0)];
        assert_eq!(revenue_concentration(&zero, 0.2), None);
    }
}
