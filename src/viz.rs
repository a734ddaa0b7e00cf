//! Console and JSON presentation of segmentation and sales reports

use crate::data::CategoryStats;
use crate::filter::PeriodFilter;
use crate::model::{CustomerMetrics, RfmMetric, RfmReport};
use crate::report::{MonthlyTrend, SalesSummary};
use serde::Serialize;

const BAR_WIDTH: usize = 30;

/// Everything the dashboard shows, in display order
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub filter: PeriodFilter,
    pub summary: SalesSummary,
    pub monthly: Vec<MonthlyTrend>,
    pub rfm: RfmReport,
    pub top_by_price: Option<Vec<CategoryStats>>,
    pub top_by_popularity: Option<Vec<CategoryStats>>,
    pub delivery_correlation: Option<f64>,
    /// Sources that could not be loaded, with the reason
    pub notices: Vec<String>,
}

impl DashboardReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Scale a value into a proportional text bar
fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(len.clamp(1, BAR_WIDTH))
}

fn metric_value(metric: RfmMetric, row: &CustomerMetrics) -> f64 {
    match metric {
        RfmMetric::Frequency => row.frequency as f64,
        RfmMetric::Monetary => row.monetary,
        RfmMetric::Recency => row.recency as f64,
    }
}

/// Join rendered lines, one per row, with a trailing newline
fn join_lines(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Render one ranking as a table, first row = highest ranked
pub fn render_ranking(metric: RfmMetric, rows: &[CustomerMetrics]) -> String {
    let title = match metric {
        RfmMetric::Recency => format!("Top {} Customers by Recency (Most Recent First)", rows.len()),
        _ => format!("Top {} Customers by {}", rows.len(), metric.label()),
    };
    let mut lines = vec![title];

    if rows.is_empty() {
        lines.push("  (no customers)".to_string());
        return join_lines(lines);
    }

    let max = rows
        .iter()
        .map(|row| metric_value(metric, row))
        .fold(0.0, f64::max);
    for (rank, row) in rows.iter().enumerate() {
        let value = metric_value(metric, row);
        let shown = match metric {
            RfmMetric::Monetary => format!("{:.2}", value),
            _ => format!("{}", value as i64),
        };
        lines.push(format!(
            "  {:>2}. {:<34} {:>12} {}",
            rank + 1,
            row.customer_id,
            shown,
            bar(value, max)
        ));
    }
    join_lines(lines)
}

pub fn render_rfm(report: &RfmReport) -> String {
    let mut out = join_lines(vec![
        "=== RFM Analysis ===".to_string(),
        format!(
            "Window: {} .. {} ({} orders, {} customers)",
            report.window_start,
            report.reference_instant,
            report.windowed_orders,
            report.metrics.len()
        ),
    ]);
    for metric in RfmMetric::ALL {
        out.push('\n');
        out.push_str(&render_ranking(metric, report.ranking(metric)));
    }
    out
}

pub fn render_monthly(trends: &[MonthlyTrend]) -> String {
    let mut lines = vec![
        "=== Monthly Sales ===".to_string(),
        format!(
            "  {:<8} | {:>14} | {:>7} | {:>9} | {:>12}",
            "Month", "Sales", "Orders", "Customers", "Avg/Customer"
        ),
        "  ---------|----------------|---------|-----------|-------------".to_string(),
    ];
    lines.extend(trends.iter().map(|t| {
        format!(
            "  {:<8} | {:>14.2} | {:>7} | {:>9} | {:>12.2}",
            t.month.format("%Y-%m"),
            t.total_sales,
            t.orders,
            t.customers,
            t.avg_spend_per_customer
        )
    }));
    join_lines(lines)
}

pub fn render_summary(summary: &SalesSummary) -> String {
    join_lines(vec![
        "=== Dashboard Insights ===".to_string(),
        format!("Total Sales: ${:.2}", summary.total_sales),
        format!("Total Orders: {}", summary.total_orders),
        format!("Total Unique Customers: {}", summary.unique_customers),
        format!("Months covered: {}", summary.months),
    ])
}

pub fn render_categories(title: &str, rows: &[CategoryStats], by_price: bool) -> String {
    let value = |c: &CategoryStats| {
        if by_price {
            c.avg_price
        } else {
            c.products_sold as f64
        }
    };
    let max = rows.iter().map(value).fold(0.0, f64::max);

    let mut lines = vec![title.to_string()];
    for c in rows {
        let shown = if by_price {
            format!("{:.2}", c.avg_price)
        } else {
            c.products_sold.to_string()
        };
        lines.push(format!("  {:<40} {:>10} {}", c.category, shown, bar(value(c), max)));
    }
    join_lines(lines)
}

/// Full text dashboard
pub fn render_dashboard(report: &DashboardReport) -> String {
    let mut out = String::new();

    if !report.notices.is_empty() {
        let notices = report.notices.iter().map(|n| format!("! {}", n)).collect();
        out.push_str(&join_lines(notices));
        out.push('\n');
    }

    out.push_str(&render_summary(&report.summary));
    out.push('\n');
    out.push_str(&render_monthly(&report.monthly));

    if let Some(rows) = &report.top_by_price {
        out.push('\n');
        out.push_str(&render_categories(
            "=== Average Product Price per Category ===",
            rows,
            true,
        ));
    }
    if let Some(rows) = &report.top_by_popularity {
        out.push('\n');
        out.push_str(&render_categories(
            "=== Product Category Popularity ===",
            rows,
            false,
        ));
    }

    out.push('\n');
    let correlation = match report.delivery_correlation {
        Some(r) => format!(
            "Pearson r = {:.4} ({})",
            r,
            crate::report::describe_correlation(r)
        ),
        None => "Not enough review data".to_string(),
    };
    out.push_str(&join_lines(vec![
        "=== Delivery Time vs Customer Satisfaction ===".to_string(),
        correlation,
    ]));

    out.push('\n');
    out.push_str(&render_rfm(&report.rfm));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{segment, OrderRecord, SegmentationConfig};
    use crate::report::{monthly_trends, sales_summary};
    use chrono::NaiveDate;

    fn create_test_report() -> DashboardReport {
        let day = |d| {
            NaiveDate::from_ymd_opt(2018, 8, d)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        };
        let orders = vec![
            OrderRecord::new("o1", "big-spender", 900.0, day(1)),
            OrderRecord::new("o2", "regular", 20.0, day(3)),
            OrderRecord::new("o3", "regular", 25.0, day(9)),
        ];

        DashboardReport {
            filter: PeriodFilter::default(),
            summary: sales_summary(&orders).unwrap(),
            monthly: monthly_trends(&orders).unwrap(),
            rfm: segment(&orders, &SegmentationConfig::default()).unwrap(),
            top_by_price: None,
            top_by_popularity: Some(vec![CategoryStats {
                category: "bed_bath_table".to_string(),
                avg_price: 93.3,
                products_sold: 11115,
            }]),
            delivery_correlation: Some(-0.33),
            notices: vec!["reviews: Source file not found: r.csv".to_string()],
        }
    }

    #[test]
    fn test_render_ranking_preserves_order() {
        let report = create_test_report();
        let text = render_ranking(RfmMetric::Monetary, &report.rfm.top_monetary);

        let big = text.find("big-spender").unwrap();
        let regular = text.find("regular").unwrap();
        assert!(big < regular);
        assert!(text.starts_with("Top 2 Customers by Monetary Value"));
    }

    #[test]
    fn test_render_dashboard_sections() {
        let report = create_test_report();
        let text = render_dashboard(&report);

        assert!(text.starts_with("! reviews"));
        assert!(text.contains("Total Unique Customers: 2"));
        assert!(text.contains("2018-08"));
        assert!(text.contains("=== Product Category Popularity ==="));
        assert!(!text.contains("=== Average Product Price per Category ==="));
        assert!(text.contains("weak negative correlation"));
        assert!(text.contains("=== RFM Analysis ==="));
    }

    #[test]
    fn test_dashboard_json() {
        let report = create_test_report();
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["rfm"]["top_recency"][0]["customer_id"], "regular");
        assert_eq!(value["rfm"]["top_recency"][0]["recency"], 0);
        assert_eq!(value["summary"]["total_orders"], 3);
    }

    #[test]
    fn test_rendered_sections_end_each_line() {
        let report = create_test_report();

        let summary = render_summary(&report.summary);
        assert_eq!(summary.lines().count(), 5);
        assert!(summary.ends_with("Months covered: 1\n"));

        let empty = render_ranking(RfmMetric::Frequency, &[]);
        assert_eq!(empty, "Top 0 Customers by Frequency\n  (no customers)\n");

        let text = render_dashboard(&report);
        assert!(text.contains("Source file not found: r.csv\n\n=== Dashboard Insights ==="));
        assert!(text.contains("Pearson r = -0.3300 (weak negative correlation)\n\n=== RFM Analysis ==="));
    }

    #[test]
    fn test_bar_scaling() {
        assert_eq!(bar(0.0, 10.0), "");
        assert_eq!(bar(10.0, 10.0).len(), BAR_WIDTH);
        assert_eq!(bar(0.01, 10.0).len(), 1);
    }
}
