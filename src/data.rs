//! Data loading for order, product popularity and delivery review extracts using Polars

use crate::error::{Result, RfmError};
use crate::model::OrderRecord;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ORDER_ID: &str = "order_id";
pub const CUSTOMER_ID: &str = "customer_id";
pub const PAYMENT_VALUE: &str = "payment_value";
pub const PURCHASE_TIMESTAMP: &str = "order_purchase_timestamp";

pub const CATEGORY: &str = "product_category_name_english";
pub const PRICE: &str = "price";
pub const PRODUCTS_SOLD: &str = "product_id";

pub const DELIVERY_TIME: &str = "delivery_time";
pub const REVIEW_SCORE: &str = "review_score";

pub(crate) const PURCHASE_MICROS: &str = "purchase_us";
pub(crate) const MONTH_KEY: &str = "month";

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Untyped view of one order row, as read from the source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOrderRow {
    pub row: usize,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub payment_value: Option<String>,
    pub purchase_timestamp: Option<String>,
}

impl RawOrderRow {
    /// Validate required fields and parse them into an [`OrderRecord`]
    pub fn into_record(self) -> Result<OrderRecord> {
        let row = self.row;
        let order_id = require(self.order_id, ORDER_ID, row)?;
        let customer_id = require(self.customer_id, CUSTOMER_ID, row)?;
        let payment_raw = require(self.payment_value, PAYMENT_VALUE, row)?;
        let timestamp_raw = require(self.purchase_timestamp, PURCHASE_TIMESTAMP, row)?;

        let payment_value = parse_amount(&payment_raw, PAYMENT_VALUE, row)?;
        if payment_value < 0.0 {
            return Err(RfmError::InvalidValue {
                field: PAYMENT_VALUE,
                row,
                value: payment_raw,
            });
        }

        let purchase_timestamp =
            parse_timestamp(&timestamp_raw).ok_or_else(|| RfmError::InvalidValue {
                field: PURCHASE_TIMESTAMP,
                row,
                value: timestamp_raw.clone(),
            })?;

        Ok(OrderRecord {
            order_id,
            customer_id,
            payment_value,
            purchase_timestamp,
        })
    }
}

/// Average price and sales volume of a product category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: String,
    pub avg_price: f64,
    pub products_sold: u64,
}

/// Delivery duration paired with the review it received
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReview {
    pub delivery_time: f64,
    pub review_score: f64,
}

/// Locations of the source extracts; only `orders` is mandatory
#[derive(Debug, Clone, Default)]
pub struct SourcePaths {
    pub orders: PathBuf,
    pub products: Option<PathBuf>,
    pub reviews: Option<PathBuf>,
}

/// Outcome of loading every configured source, one result per source
#[derive(Debug)]
pub struct DataSources {
    pub orders: Result<Vec<OrderRecord>>,
    pub products: Option<Result<Vec<CategoryStats>>>,
    pub reviews: Option<Result<Vec<DeliveryReview>>>,
}

impl DataSources {
    /// Load each source independently so one failure does not hide the others
    pub fn load(paths: &SourcePaths) -> Self {
        let orders = load_orders(&paths.orders);
        let products = paths.products.as_deref().map(load_product_popularity);
        let reviews = paths.reviews.as_deref().map(load_delivery_reviews);

        for (name, failed) in [
            ("orders", orders.as_ref().err()),
            ("products", products.as_ref().and_then(|r| r.as_ref().err())),
            ("reviews", reviews.as_ref().and_then(|r| r.as_ref().err())),
        ] {
            if let Some(err) = failed {
                warn!(source = name, error = %err, "Failed to load source");
            }
        }

        Self {
            orders,
            products,
            reviews,
        }
    }
}

/// Load order rows and convert them into validated [`OrderRecord`]s
///
/// Extra columns are ignored and column order does not matter. The first
/// missing or malformed value aborts the load.
pub fn load_orders(path: &Path) -> Result<Vec<OrderRecord>> {
    let df = read_csv(path)?;

    let order_ids = string_column(&df, ORDER_ID)?;
    let customer_ids = string_column(&df, CUSTOMER_ID)?;
    let payments = string_column(&df, PAYMENT_VALUE)?;
    let timestamps = string_column(&df, PURCHASE_TIMESTAMP)?;

    let records = order_ids
        .into_iter()
        .zip(customer_ids)
        .zip(payments)
        .zip(timestamps)
        .enumerate()
        .map(|(row, (((order_id, customer_id), payment_value), purchase_timestamp))| {
            RawOrderRow {
                row,
                order_id,
                customer_id,
                payment_value,
                purchase_timestamp,
            }
            .into_record()
        })
        .collect::<Result<Vec<_>>>()?;

    info!(rows = records.len(), path = %path.display(), "Loaded orders");
    Ok(records)
}

/// Load per-category average price and number of products sold
pub fn load_product_popularity(path: &Path) -> Result<Vec<CategoryStats>> {
    let df = read_csv(path)?;

    let categories = string_column(&df, CATEGORY)?;
    let prices = string_column(&df, PRICE)?;
    let sold = string_column(&df, PRODUCTS_SOLD)?;

    let mut stats = Vec::with_capacity(categories.len());
    for (row, ((category, price), products_sold)) in
        categories.into_iter().zip(prices).zip(sold).enumerate()
    {
        let category = require(category, CATEGORY, row)?;
        let price = require(price, PRICE, row)?;
        let products_sold = require(products_sold, PRODUCTS_SOLD, row)?;

        let avg_price = parse_amount(&price, PRICE, row)?;
        // Counts may have been written as floats ("42.0")
        let products_sold = parse_amount(&products_sold, PRODUCTS_SOLD, row)?;
        if products_sold < 0.0 || products_sold.fract() != 0.0 {
            return Err(RfmError::InvalidValue {
                field: PRODUCTS_SOLD,
                row,
                value: products_sold.to_string(),
            });
        }

        stats.push(CategoryStats {
            category,
            avg_price,
            products_sold: products_sold as u64,
        });
    }

    info!(rows = stats.len(), path = %path.display(), "Loaded product popularity");
    Ok(stats)
}

/// Load delivery time / review score pairs, skipping rows where either is empty
pub fn load_delivery_reviews(path: &Path) -> Result<Vec<DeliveryReview>> {
    let df = read_csv(path)?;

    let delivery = string_column(&df, DELIVERY_TIME)?;
    let scores = string_column(&df, REVIEW_SCORE)?;

    let mut reviews = Vec::with_capacity(delivery.len());
    let mut skipped = 0usize;
    for (row, (delivery_time, review_score)) in delivery.into_iter().zip(scores).enumerate() {
        let present = |v: Option<String>| v.filter(|v| !v.trim().is_empty());
        let (Some(delivery_time), Some(review_score)) = (present(delivery_time), present(review_score))
        else {
            skipped += 1;
            continue;
        };
        reviews.push(DeliveryReview {
            delivery_time: parse_amount(&delivery_time, DELIVERY_TIME, row)?,
            review_score: parse_amount(&review_score, REVIEW_SCORE, row)?,
        });
    }

    if skipped > 0 {
        debug!(skipped, "Skipped review rows with missing values");
    }
    info!(rows = reviews.len(), path = %path.display(), "Loaded delivery reviews");
    Ok(reviews)
}

/// Build the in-memory frame the aggregations run on
///
/// Columns: `customer_id` (String), `payment_value` (Float64), `purchase_us`
/// (Int64 microseconds since the epoch) and `month` (Int32, `yyyymm`).
pub(crate) fn orders_frame<'a, I>(orders: I) -> Result<DataFrame>
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    let mut customer_ids = Vec::new();
    let mut payments = Vec::new();
    let mut instants = Vec::new();
    let mut months = Vec::new();

    for order in orders {
        let ts = order.purchase_timestamp;
        customer_ids.push(order.customer_id.as_str());
        payments.push(order.payment_value);
        instants.push(ts.and_utc().timestamp_micros());
        months.push(ts.year() * 100 + ts.month() as i32);
    }

    let df = DataFrame::new(vec![
        Series::new(CUSTOMER_ID, customer_ids),
        Series::new(PAYMENT_VALUE, payments),
        Series::new(PURCHASE_MICROS, instants),
        Series::new(MONTH_KEY, months),
    ])?;
    Ok(df)
}

pub(crate) fn str_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_owned())
        .collect();
    Ok(values)
}

pub(crate) fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect();
    Ok(values)
}

pub(crate) fn u64_values(df: &DataFrame, name: &str) -> Result<Vec<u64>> {
    let series = df.column(name)?.cast(&DataType::UInt64)?;
    let values = series.u64()?.into_iter().map(|v| v.unwrap_or(0)).collect();
    Ok(values)
}

pub(crate) fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_iter().map(|v| v.unwrap_or(0)).collect();
    Ok(values)
}

/// Parse a purchase timestamp; date-only values land on midnight
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let value = value.strip_suffix('Z').unwrap_or(value);

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(RfmError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    // Every column is read as text; ids keep leading zeros and values are parsed per field
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .collect()?;

    debug!(rows = df.height(), columns = df.width(), "Read CSV");
    Ok(df)
}

/// Extract a column as optional strings; empty cells come back as `None`
fn string_column(df: &DataFrame, name: &'static str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)
        .map_err(|_| RfmError::MissingField {
            field: name,
            row: None,
        })?
        .cast(&DataType::String)?;

    let values = series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_owned))
        .collect();

    Ok(values)
}

fn require(value: Option<String>, field: &'static str, row: usize) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RfmError::MissingField {
            field,
            row: Some(row),
        }),
    }
}

fn parse_amount(value: &str, field: &'static str, row: usize) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RfmError::InvalidValue {
            field,
            row,
            value: value.to_string(),
        })
}
