//! rfmforge: RFM customer segmentation and sales reporting for e-commerce order extracts
//!
//! The core is a pure segmentation engine ([`model`]) that windows orders to the
//! trailing calendar months before the latest purchase, aggregates recency,
//! frequency and monetary value per customer, and ranks them. Loading, period
//! filtering, sales reports and presentation sit around it as separate modules.

pub mod cli;
pub mod data;
pub mod error;
pub mod filter;
pub mod model;
pub mod report;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_orders, DataSources, RawOrderRow, SourcePaths};
pub use error::RfmError;
pub use filter::PeriodFilter;
pub use model::{
    aggregate, compute_window, segment, top_n, top_n_default, CustomerMetrics,
    CustomerMetricsTable, OrderRecord, RfmMetric, RfmReport, RfmWindow, SegmentationConfig,
};
pub use viz::{render_dashboard, DashboardReport};

/// Common result type used throughout the library
pub type Result<T> = error::Result<T>;
