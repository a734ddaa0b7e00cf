//! Error types for segmentation, loading and filtering

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RfmError {
    #[error("No orders to segment: input is empty")]
    EmptyInput,

    #[error("Missing required field '{}'{}", .field, row_suffix(.row))]
    MissingField {
        field: &'static str,
        row: Option<usize>,
    },

    #[error("Invalid value '{value}' for field '{field}' at row {row}")]
    InvalidValue {
        field: &'static str,
        row: usize,
        value: String,
    },

    #[error("Window of {months} month(s) falls outside the representable date range")]
    WindowOutOfRange { months: u32 },

    #[error("Invalid period filter: {0}")]
    InvalidFilter(String),

    #[error("Source file not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at row {}", row),
        None => " (column absent)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, RfmError>;
