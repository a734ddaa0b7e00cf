//! rfmforge: e-commerce sales dashboard with RFM customer segmentation
//!
//! Loads the order, product and review extracts, applies the period filter,
//! and prints the sales, catalogue and RFM sections.

use anyhow::{Context, Result};
use clap::Parser;
use rfmforge::data::DataSources;
use rfmforge::report::{self, DEFAULT_CATEGORY_LIMIT};
use rfmforge::{filter, segment, viz, Args, DashboardReport};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.segmentation_config()?;
    let period = args.period_filter()?;

    let start_time = Instant::now();

    // Step 1: Load every configured source
    let paths = args.source_paths();
    info!(orders = %paths.orders.display(), "Loading data sources");
    let DataSources {
        orders,
        products,
        reviews,
    } = DataSources::load(&paths);

    let orders = orders.with_context(|| {
        format!("Could not load orders from {}", paths.orders.display())
    })?;
    let mut notices = Vec::new();
    let products = optional_source("products", products, &mut notices);
    let reviews = optional_source("reviews", reviews, &mut notices);

    debug!(
        years = ?filter::available_years(&orders),
        months = ?filter::available_months(&orders),
        "Available periods"
    );

    // Step 2: Period filter
    let filtered = period.apply(&orders);
    info!(before = orders.len(), after = filtered.len(), "Applied period filter");
    if filtered.is_empty() {
        println!("No data in selected range.");
        return Ok(());
    }

    // Step 3: Reports and segmentation
    let rfm_start = Instant::now();
    let rfm = segment(&filtered, &config)?;
    debug!(elapsed_ms = rfm_start.elapsed().as_millis() as u64, "Segmentation finished");

    let dashboard = DashboardReport {
        filter: period,
        summary: report::sales_summary(&filtered)?,
        monthly: report::monthly_trends(&filtered)?,
        rfm,
        top_by_price: products
            .as_deref()
            .map(|stats| report::top_categories_by_price(stats, DEFAULT_CATEGORY_LIMIT)),
        top_by_popularity: products
            .as_deref()
            .map(|stats| report::top_categories_by_popularity(stats, DEFAULT_CATEGORY_LIMIT)),
        delivery_correlation: reviews
            .as_deref()
            .and_then(report::delivery_satisfaction_correlation),
        notices,
    };

    // Step 4: Output
    if args.json {
        println!("{}", dashboard.to_json()?);
    } else {
        print!("{}", viz::render_dashboard(&dashboard));
    }

    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Dashboard complete"
    );
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Turn a failed supplementary source into a visible notice instead of an abort
fn optional_source<T>(
    name: &str,
    source: Option<rfmforge::Result<Vec<T>>>,
    notices: &mut Vec<String>,
) -> Option<Vec<T>> {
    match source? {
        Ok(rows) => Some(rows),
        Err(err) => {
            warn!(source = name, error = %err, "Skipping section");
            notices.push(format!("{}: {}", name, err));
            None
        }
    }
}
