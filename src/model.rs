//! RFM segmentation engine: trailing window, per-customer aggregation and ranking

use crate::data::{
    f64_values, i64_values, orders_frame, str_values, u64_values, CUSTOMER_ID, PAYMENT_VALUE,
    PURCHASE_MICROS,
};
use crate::error::{Result, RfmError};
use chrono::{Months, NaiveDateTime};
use polars::prelude::{col, lit, IntoLazy, LazyFrame};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// One order (or order payment) row as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: String,
    pub payment_value: f64,
    pub purchase_timestamp: NaiveDateTime,
}

impl OrderRecord {
    pub fn new(
        order_id: impl Into<String>,
        customer_id: impl Into<String>,
        payment_value: f64,
        purchase_timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            customer_id: customer_id.into(),
            payment_value,
            purchase_timestamp,
        }
    }
}

/// Recency, frequency and monetary value of a single customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub customer_id: String,
    /// Number of rows in the window
    pub frequency: u64,
    /// Sum of payment values in the window
    pub monetary: f64,
    /// Whole days between the window's latest order and this customer's latest order
    pub recency: i64,
}

/// Metric used to rank customers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfmMetric {
    Frequency,
    Monetary,
    Recency,
}

impl RfmMetric {
    pub const ALL: [RfmMetric; 3] = [RfmMetric::Recency, RfmMetric::Frequency, RfmMetric::Monetary];

    /// Recency ranks smallest first, the other metrics largest first
    pub fn default_ascending(self) -> bool {
        matches!(self, RfmMetric::Recency)
    }

    pub fn label(self) -> &'static str {
        match self {
            RfmMetric::Frequency => "Frequency",
            RfmMetric::Monetary => "Monetary Value",
            RfmMetric::Recency => "Recency (Days)",
        }
    }

    fn compare(self, a: &CustomerMetrics, b: &CustomerMetrics) -> Ordering {
        match self {
            RfmMetric::Frequency => a.frequency.cmp(&b.frequency),
            RfmMetric::Monetary => a.monetary.total_cmp(&b.monetary),
            RfmMetric::Recency => a.recency.cmp(&b.recency),
        }
    }
}

/// Tunables for a segmentation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub window_months: u32,
    pub top_n: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            window_months: 1,
            top_n: 5,
        }
    }
}

/// Orders falling inside the trailing window
#[derive(Debug, Clone)]
pub struct RfmWindow<'a> {
    pub reference_instant: NaiveDateTime,
    pub window_start: NaiveDateTime,
    pub orders: Vec<&'a OrderRecord>,
}

/// Per-customer metrics keyed by customer id, iterated in ascending id order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerMetricsTable {
    metrics: BTreeMap<String, CustomerMetrics>,
}

impl CustomerMetricsTable {
    pub fn get(&self, customer_id: &str) -> Option<&CustomerMetrics> {
        self.metrics.get(customer_id)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomerMetrics> {
        self.metrics.values()
    }
}

/// Output of a full segmentation run
#[derive(Debug, Clone, Serialize)]
pub struct RfmReport {
    pub reference_instant: NaiveDateTime,
    pub window_start: NaiveDateTime,
    pub windowed_orders: usize,
    pub metrics: CustomerMetricsTable,
    pub top_recency: Vec<CustomerMetrics>,
    pub top_frequency: Vec<CustomerMetrics>,
    pub top_monetary: Vec<CustomerMetrics>,
}

impl RfmReport {
    pub fn ranking(&self, metric: RfmMetric) -> &[CustomerMetrics] {
        match metric {
            RfmMetric::Frequency => &self.top_frequency,
            RfmMetric::Monetary => &self.top_monetary,
            RfmMetric::Recency => &self.top_recency,
        }
    }
}

/// Restrict orders to the trailing `window_months` calendar months ending at the latest purchase
///
/// The lower bound is inclusive. Month subtraction clamps to the last valid day,
/// so a reference instant on March 31st starts the window on the last day of February.
pub fn compute_window(orders: &[OrderRecord], window_months: u32) -> Result<RfmWindow<'_>> {
    let (reference_instant, window_start) = window_bounds(orders, window_months)?;

    let windowed = orders
        .iter()
        .filter(|order| order.purchase_timestamp >= window_start)
        .collect();

    Ok(RfmWindow {
        reference_instant,
        window_start,
        orders: windowed,
    })
}

fn window_bounds(orders: &[OrderRecord], window_months: u32) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let reference_instant = orders
        .iter()
        .map(|order| order.purchase_timestamp)
        .max()
        .ok_or(RfmError::EmptyInput)?;

    let window_start = reference_instant
        .checked_sub_months(Months::new(window_months))
        .ok_or(RfmError::WindowOutOfRange {
            months: window_months,
        })?;

    Ok((reference_instant, window_start))
}

/// Group windowed orders by customer and compute frequency, monetary and recency
///
/// Recency is measured against the latest timestamp of the rows passed in,
/// not of any wider dataset.
pub fn aggregate<'a, I>(windowed_orders: I) -> Result<CustomerMetricsTable>
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    let df = orders_frame(windowed_orders)?;
    aggregate_frame(df.lazy())
}

/// Per-customer RFM over an orders frame, using Polars group-by
fn aggregate_frame(orders: LazyFrame) -> Result<CustomerMetricsTable> {
    let rfm_df = orders
        .group_by([col(CUSTOMER_ID)])
        .agg([
            // Frequency: number of rows
            col(PAYMENT_VALUE).count().alias("frequency"),
            // Monetary: total spending
            col(PAYMENT_VALUE).sum().alias("monetary"),
            // Latest purchase of the customer
            col(PURCHASE_MICROS).max().alias("latest"),
        ])
        .with_columns([
            // Distance to the latest purchase of the whole frame
            (col("latest").max() - col("latest")).alias("recency_us"),
        ])
        .collect()?;

    if rfm_df.height() == 0 {
        return Ok(CustomerMetricsTable::default());
    }

    let customer_ids = str_values(&rfm_df, CUSTOMER_ID)?;
    let frequency = u64_values(&rfm_df, "frequency")?;
    let monetary = f64_values(&rfm_df, "monetary")?;
    let recency_us = i64_values(&rfm_df, "recency_us")?;

    let metrics = customer_ids
        .into_iter()
        .zip(frequency)
        .zip(monetary)
        .zip(recency_us)
        .map(|(((customer_id, frequency), monetary), recency_us)| {
            let row = CustomerMetrics {
                customer_id: customer_id.clone(),
                frequency,
                monetary,
                // Whole days, truncated
                recency: recency_us / MICROS_PER_DAY,
            };
            (customer_id, row)
        })
        .collect();

    Ok(CustomerMetricsTable { metrics })
}

/// Rank customers by `by` and keep the first `n`
///
/// Ties keep the table's ascending customer id order.
pub fn top_n(
    metrics: &CustomerMetricsTable,
    by: RfmMetric,
    n: usize,
    ascending: bool,
) -> Vec<CustomerMetrics> {
    let mut ranked: Vec<&CustomerMetrics> = metrics.iter().collect();
    ranked.sort_by(|a, b| {
        let ord = by.compare(a, b);
        if ascending {
            ord
        } else {
            ord.reverse()
        }
    });
    ranked.into_iter().take(n).cloned().collect()
}

/// Rank with the metric's natural direction
pub fn top_n_default(metrics: &CustomerMetricsTable, by: RfmMetric, n: usize) -> Vec<CustomerMetrics> {
    top_n(metrics, by, n, by.default_ascending())
}

/// Window, aggregate and rank in one call
pub fn segment(orders: &[OrderRecord], config: &SegmentationConfig) -> Result<RfmReport> {
    let (reference_instant, window_start) = window_bounds(orders, config.window_months)?;
    debug!(
        reference = %reference_instant,
        start = %window_start,
        "Computed RFM window"
    );

    let start_us = window_start.and_utc().timestamp_micros();
    let windowed = orders_frame(orders)?
        .lazy()
        .filter(col(PURCHASE_MICROS).gt_eq(lit(start_us)));
    let metrics = aggregate_frame(windowed)?;
    let windowed_orders = metrics.iter().map(|m| m.frequency as usize).sum();
    debug!(
        customers = metrics.len(),
        rows = windowed_orders,
        "Aggregated customer metrics"
    );

    Ok(RfmReport {
        reference_instant,
        window_start,
        windowed_orders,
        top_recency: top_n_default(&metrics, RfmMetric::Recency, config.top_n),
        top_frequency: top_n_default(&metrics, RfmMetric::Frequency, config.top_n),
        top_monetary: top_n_default(&metrics, RfmMetric::Monetary, config.top_n),
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn scenario_orders() -> Vec<OrderRecord> {
        vec![
            OrderRecord::new("o1", "C1", 100.0, ts(2024, 1, 1)),
            OrderRecord::new("o2", "C1", 50.0, ts(2024, 1, 10)),
            OrderRecord::new("o3", "C2", 200.0, ts(2024, 1, 15)),
        ]
    }

    #[test]
    fn test_compute_window_scenario() {
        let orders = scenario_orders();
        let window = compute_window(&orders, 1).unwrap();

        assert_eq!(window.reference_instant, ts(2024, 1, 15));
        assert_eq!(window.window_start, ts(2023, 12, 15));
        assert_eq!(window.orders.len(), 3);
    }

    #[test]
    fn test_compute_window_empty_input() {
        let result = compute_window(&[], 1);
        assert!(matches!(result, Err(RfmError::EmptyInput)));
    }

    #[test]
    fn test_compute_window_excludes_old_rows() {
        let orders = vec![
            OrderRecord::new("o1", "C1", 10.0, ts(2024, 1, 14)),
            OrderRecord::new("o2", "C1", 10.0, ts(2024, 1, 15)),
            OrderRecord::new("o3", "C2", 10.0, ts(2024, 2, 15)),
        ];
        let window = compute_window(&orders, 1).unwrap();

        // Lower bound is inclusive: 2024-01-15 stays, 2024-01-14 is dropped
        let ids: Vec<&str> = window.orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["o2", "o3"]);
    }

    #[test]
    fn test_compute_window_clamps_month_end() {
        let orders = vec![
            OrderRecord::new("o1", "C1", 10.0, ts(2024, 2, 28)),
            OrderRecord::new("o2", "C1", 10.0, ts(2024, 2, 29)),
            OrderRecord::new("o3", "C2", 10.0, ts(2024, 3, 31)),
        ];
        let window = compute_window(&orders, 1).unwrap();

        assert_eq!(window.window_start, ts(2024, 2, 29));
        assert_eq!(window.orders.len(), 2);
    }

    #[test]
    fn test_compute_window_multiple_months() {
        let orders = vec![
            OrderRecord::new("o1", "C1", 10.0, ts(2023, 10, 1)),
            OrderRecord::new("o2", "C1", 10.0, ts(2023, 11, 20)),
            OrderRecord::new("o3", "C2", 10.0, ts(2024, 1, 15)),
        ];
        let window = compute_window(&orders, 3).unwrap();

        assert_eq!(window.window_start, ts(2023, 10, 15));
        assert_eq!(window.orders.len(), 2);
    }

    #[test]
    fn test_aggregate_scenario() {
        let orders = scenario_orders();
        let window = compute_window(&orders, 1).unwrap();
        let metrics = aggregate(window.orders.iter().copied()).unwrap();

        assert_eq!(metrics.len(), 2);

        let c1 = metrics.get("C1").unwrap();
        assert_eq!(c1.frequency, 2);
        assert_eq!(c1.monetary, 150.0);
        assert_eq!(c1.recency, 5);

        let c2 = metrics.get("C2").unwrap();
        assert_eq!(c2.frequency, 1);
        assert_eq!(c2.monetary, 200.0);
        assert_eq!(c2.recency, 0);
    }

    #[test]
    fn test_aggregate_truncates_partial_days() {
        let latest = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let earlier = NaiveDate::from_ymd_opt(2024, 1, 13)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let orders = vec![
            OrderRecord::new("o1", "C1", 1.0, earlier),
            OrderRecord::new("o2", "C2", 1.0, latest),
        ];
        let metrics = aggregate(&orders).unwrap();

        // 1 day 18 hours
        assert_eq!(metrics.get("C1").unwrap().recency, 1);
    }

    #[test]
    fn test_aggregate_empty() {
        let metrics = aggregate(std::iter::empty()).unwrap();
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_top_n_scenario() {
        let orders = scenario_orders();
        let metrics = aggregate(&orders).unwrap();

        let top = top_n(&metrics, RfmMetric::Monetary, 1, false);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].customer_id, "C2");

        let recent = top_n_default(&metrics, RfmMetric::Recency, 5);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].customer_id, "C2");
        assert_eq!(recent[1].customer_id, "C1");
    }

    #[test]
    fn test_top_n_ties_follow_customer_id() {
        let day = ts(2024, 5, 1);
        let orders = vec![
            OrderRecord::new("o1", "zeta", 10.0, day),
            OrderRecord::new("o2", "alpha", 10.0, day),
            OrderRecord::new("o3", "mid", 10.0, day),
        ];
        let metrics = aggregate(&orders).unwrap();

        for metric in RfmMetric::ALL {
            let ids: Vec<String> = top_n_default(&metrics, metric, 3)
                .into_iter()
                .map(|m| m.customer_id)
                .collect();
            assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
        }
    }

    #[test]
    fn test_top_n_zero() {
        let metrics = aggregate(&scenario_orders()).unwrap();
        assert!(top_n(&metrics, RfmMetric::Frequency, 0, false).is_empty());
    }

    #[test]
    fn test_segment_report() {
        let orders = scenario_orders();
        let report = segment(&orders, &SegmentationConfig::default()).unwrap();

        assert_eq!(report.windowed_orders, 3);
        assert_eq!(report.ranking(RfmMetric::Frequency)[0].customer_id, "C1");
        assert_eq!(report.ranking(RfmMetric::Monetary)[0].customer_id, "C2");
        assert_eq!(report.ranking(RfmMetric::Recency)[0].customer_id, "C2");
    }

    #[test]
    fn test_segment_window_matches_compute_window() {
        let at = |m, d| {
            NaiveDate::from_ymd_opt(2018, m, d)
                .unwrap()
                .and_hms_opt(16, 30, 0)
                .unwrap()
        };
        let (reference, boundary) = (at(8, 29), at(7, 29));
        let orders = vec![
            OrderRecord::new("o1", "007", 10.0, reference),
            OrderRecord::new("o2", "7", 20.0, boundary),
            // One second before the window opens
            OrderRecord::new("o3", "7", 40.0, boundary - chrono::Duration::seconds(1)),
            OrderRecord::new("o4", "old", 99.0, ts(2017, 1, 1)),
        ];

        let report = segment(&orders, &SegmentationConfig::default()).unwrap();
        let window = compute_window(&orders, 1).unwrap();
        assert_eq!(report.windowed_orders, window.orders.len());
        assert_eq!(report.windowed_orders, 2);
        assert_eq!(report.metrics, aggregate(window.orders.iter().copied()).unwrap());

        let kept = report.metrics.get("7").unwrap();
        assert_eq!((kept.frequency, kept.monetary, kept.recency), (1, 20.0, 31));
        assert_eq!(report.metrics.get("007").unwrap().monetary, 10.0);
        assert!(report.metrics.get("old").is_none());
    }

    #[test]
    fn test_segment_empty_input() {
        let result = segment(&[], &SegmentationConfig::default());
        assert!(matches!(result, Err(RfmError::EmptyInput)));
    }
}
