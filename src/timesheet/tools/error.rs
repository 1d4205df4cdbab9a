use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool drives the portal, reads exports, or writes reports.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when the client roster cannot be read or the ledger written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Transport failures talking to the browser driver.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the roster has no usable `Client` column.
    #[error("roster {0} has no 'Client' column")]
    MissingClientColumn(PathBuf),

    /// Raised when a date is not in `DD/MM/YYYY` form.
    #[error("invalid date '{0}', expected DD/MM/YYYY")]
    InvalidDate(String),

    /// Raised when the start of a date range falls after its end.
    #[error("date range starts after it ends: {from} > {to}")]
    InvalidDateRange { from: String, to: String },

    /// Raised when no supplied artifact passed validation.
    #[error("no usable artifacts: all {rejected} input(s) were rejected")]
    AllRejected { rejected: usize },

    /// Raised when the remote portal or its driver reports a failure.
    #[error("remote session error: {0}")]
    Remote(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
