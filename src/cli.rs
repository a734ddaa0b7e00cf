//! Command-line interface definitions and argument parsing

use crate::data::SourcePaths;
use crate::filter::PeriodFilter;
use crate::model::SegmentationConfig;
use clap::Parser;
use std::path::PathBuf;

/// RFM customer segmentation and sales reporting over e-commerce order extracts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Order-level CSV (order_id, customer_id, payment_value, order_purchase_timestamp)
    #[arg(short, long, env = "RFMFORGE_ORDERS", default_value = "orders_items_payments.csv")]
    pub orders: PathBuf,

    /// Product popularity CSV (product_category_name_english, price, product_id)
    #[arg(short, long, env = "RFMFORGE_PRODUCTS")]
    pub products: Option<PathBuf>,

    /// Delivery time vs satisfaction CSV (delivery_time, review_score)
    #[arg(short, long, env = "RFMFORGE_REVIEWS")]
    pub reviews: Option<PathBuf>,

    /// Trailing window for RFM metrics, in calendar months
    #[arg(short, long, default_value = "1")]
    pub window_months: u32,

    /// Number of customers per ranking
    #[arg(short = 'n', long, default_value = "5")]
    pub top: usize,

    /// Restrict to these years, comma-separated (e.g. "2017,2018")
    #[arg(long)]
    pub years: Option<String>,

    /// Restrict to these months, comma-separated names or numbers (e.g. "jan,2,March")
    #[arg(long)]
    pub months: Option<String>,

    /// Print the report as JSON instead of text tables
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn source_paths(&self) -> SourcePaths {
        SourcePaths {
            orders: self.orders.clone(),
            products: self.products.clone(),
            reviews: self.reviews.clone(),
        }
    }

    pub fn period_filter(&self) -> crate::Result<PeriodFilter> {
        PeriodFilter::parse(self.years.as_deref(), self.months.as_deref())
    }

    /// Segmentation settings; a window of zero months or an empty ranking is rejected
    pub fn segmentation_config(&self) -> anyhow::Result<SegmentationConfig> {
        if self.window_months == 0 {
            anyhow::bail!("Window must span at least one month");
        }
        if self.top == 0 {
            anyhow::bail!("Ranking size must be at least 1");
        }

        Ok(SegmentationConfig {
            window_months: self.window_months,
            top_n: self.top,
        })
    }
}
