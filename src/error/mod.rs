//! Domain errors raised by the price pipeline.
//!
//! Every variant is fatal to a run except `InsufficientHistory`, which only
//! surfaces when a caller explicitly asks for a moving average that does not
//! exist yet.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required field is missing or violates its pattern/range.
    #[error("malformed record in {source_name} row {row}, column {column}: {reason} (value: {value:?})")]
    MalformedRecord {
        source_name: String,
        row: usize,
        column: String,
        value: String,
        reason: String,
    },

    #[error("duplicate date {date} in {source_name} (rows {first_row} and {second_row})")]
    DuplicateDate {
        source_name: String,
        date: NaiveDate,
        first_row: usize,
        second_row: usize,
    },

    #[error(
        "sources disagree on {date}: {first_source} has {first_price}, {second_source} has {second_price} (tolerance {tolerance})"
    )]
    SourceOverlapConflict {
        date: NaiveDate,
        first_source: String,
        first_price: Decimal,
        second_source: String,
        second_price: Decimal,
        tolerance: Decimal,
    },

    #[error("unresolvable gap: {reason}")]
    UnresolvableGap { reason: String },

    #[error("insufficient history for {date}: {available} of {required} days available")]
    InsufficientHistory {
        date: NaiveDate,
        available: usize,
        required: usize,
    },

    #[error("schema violation in {table} row {row}, column {column}: {reason}")]
    SchemaViolation {
        table: String,
        row: usize,
        column: String,
        reason: String,
    },

    /// A decimal computation left the representable range.
    #[error("arithmetic overflow computing {operation} for {date}")]
    ArithmeticOverflow {
        date: NaiveDate,
        operation: &'static str,
    },

    #[error("invalid analytics settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn malformed(
        source_name: &str,
        row: usize,
        column: &str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::MalformedRecord {
            source_name: source_name.to_string(),
            row,
            column: column.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn overflow(date: NaiveDate, operation: &'static str) -> Self {
        PipelineError::ArithmeticOverflow { date, operation }
    }

    pub fn schema(table: &str, row: usize, column: &str, reason: impl Into<String>) -> Self {
        PipelineError::SchemaViolation {
            table: table.to_string(),
            row,
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}
