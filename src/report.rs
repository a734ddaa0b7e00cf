//! Sales trends, product popularity rankings and delivery/satisfaction correlation

use crate::data::{
    f64_values, i64_values, orders_frame, u64_values, CategoryStats, DeliveryReview, CUSTOMER_ID,
    MONTH_KEY, PAYMENT_VALUE,
};
use crate::error::Result;
use crate::model::OrderRecord;
use chrono::NaiveDate;
use polars::prelude::{col, IntoLazy};
use serde::Serialize;

pub const DEFAULT_CATEGORY_LIMIT: usize = 10;

/// Aggregates for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    /// First day of the month
    pub month: NaiveDate,
    pub total_sales: f64,
    pub orders: u64,
    pub customers: u64,
    /// Mean over customers of their total spend in the month
    pub avg_spend_per_customer: f64,
}

/// Headline totals over the selected period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub total_sales: f64,
    pub total_orders: u64,
    pub unique_customers: u64,
    pub months: usize,
}

/// Monthly sales, order count, distinct customers and average spend, ascending by month
pub fn monthly_trends(orders: &[OrderRecord]) -> Result<Vec<MonthlyTrend>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }
    let frame = orders_frame(orders)?.lazy();

    let avg_spend = frame
        .clone()
        .group_by([col(MONTH_KEY), col(CUSTOMER_ID)])
        .agg([col(PAYMENT_VALUE).sum().alias("spend")])
        .group_by([col(MONTH_KEY)])
        .agg([col("spend").mean().alias("avg_spend_per_customer")]);

    let monthly_df = frame
        .group_by([col(MONTH_KEY)])
        .agg([
            col(PAYMENT_VALUE).sum().alias("total_sales"),
            col(PAYMENT_VALUE).count().alias("orders"),
            // Distinct customers, not rows
            col(CUSTOMER_ID).n_unique().alias("customers"),
        ])
        .left_join(avg_spend, col(MONTH_KEY), col(MONTH_KEY))
        .collect()?;

    let month_keys = i64_values(&monthly_df, MONTH_KEY)?;
    let total_sales = f64_values(&monthly_df, "total_sales")?;
    let order_counts = u64_values(&monthly_df, "orders")?;
    let customers = u64_values(&monthly_df, "customers")?;
    let avg_spend = f64_values(&monthly_df, "avg_spend_per_customer")?;

    let mut trends = Vec::with_capacity(month_keys.len());
    for ((((key, total_sales), orders), customers), avg_spend_per_customer) in month_keys
        .into_iter()
        .zip(total_sales)
        .zip(order_counts)
        .zip(customers)
        .zip(avg_spend)
    {
        let Some(month) = NaiveDate::from_ymd_opt((key / 100) as i32, (key % 100) as u32, 1) else {
            continue;
        };
        trends.push(MonthlyTrend {
            month,
            total_sales,
            orders,
            customers,
            avg_spend_per_customer,
        });
    }
    trends.sort_by_key(|trend| trend.month);

    Ok(trends)
}

pub fn sales_summary(orders: &[OrderRecord]) -> Result<SalesSummary> {
    if orders.is_empty() {
        return Ok(SalesSummary {
            total_sales: 0.0,
            total_orders: 0,
            unique_customers: 0,
            months: 0,
        });
    }

    let summary_df = orders_frame(orders)?
        .lazy()
        .select([
            col(PAYMENT_VALUE).sum().alias("total_sales"),
            col(PAYMENT_VALUE).count().alias("total_orders"),
            col(CUSTOMER_ID).n_unique().alias("unique_customers"),
            col(MONTH_KEY).n_unique().alias("months"),
        ])
        .collect()?;

    let first_u64 = |name: &str| -> Result<u64> {
        Ok(u64_values(&summary_df, name)?.first().copied().unwrap_or(0))
    };

    Ok(SalesSummary {
        total_sales: f64_values(&summary_df, "total_sales")?
            .first()
            .copied()
            .unwrap_or(0.0),
        total_orders: first_u64("total_orders")?,
        unique_customers: first_u64("unique_customers")?,
        months: first_u64("months")? as usize,
    })
}

/// Highest average price first; ties keep input order
pub fn top_categories_by_price(stats: &[CategoryStats], n: usize) -> Vec<CategoryStats> {
    let mut ranked: Vec<&CategoryStats> = stats.iter().collect();
    ranked.sort_by(|a, b| b.avg_price.total_cmp(&a.avg_price));
    ranked.into_iter().take(n).cloned().collect()
}

/// Most products sold first; ties keep input order
pub fn top_categories_by_popularity(stats: &[CategoryStats], n: usize) -> Vec<CategoryStats> {
    let mut ranked: Vec<&CategoryStats> = stats.iter().collect();
    ranked.sort_by(|a, b| b.products_sold.cmp(&a.products_sold));
    ranked.into_iter().take(n).cloned().collect()
}

/// Pearson correlation between delivery time and review score
///
/// Returns `None` with fewer than two pairs or when either series is constant.
pub fn delivery_satisfaction_correlation(reviews: &[DeliveryReview]) -> Option<f64> {
    if reviews.len() < 2 {
        return None;
    }

    let n = reviews.len() as f64;
    let mean_x = reviews.iter().map(|r| r.delivery_time).sum::<f64>() / n;
    let mean_y = reviews.iter().map(|r| r.review_score).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for review in reviews {
        let dx = review.delivery_time - mean_x;
        let dy = review.review_score - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Qualitative reading of a correlation coefficient
pub fn describe_correlation(r: f64) -> &'static str {
    let strength = r.abs();
    match (strength, r.is_sign_negative()) {
        (s, _) if s < 0.1 => "no meaningful correlation",
        (s, true) if s < 0.4 => "weak negative correlation",
        (s, false) if s < 0.4 => "weak positive correlation",
        (s, true) if s < 0.7 => "moderate negative correlation",
        (s, false) if s < 0.7 => "moderate positive correlation",
        (_, true) => "strong negative correlation",
        (_, false) => "strong positive correlation",
    }
}
