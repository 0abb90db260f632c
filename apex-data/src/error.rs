use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening or parsing tick files and applying market data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tick file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("bad tickbin preamble: {0}")]
    BadPreamble(String),

    #[error("bad tickbin record: {0}")]
    BadRecord(String),

    #[error("CSV header problem; expected {expected:?}, actual {actual:?}")]
    BadCsvHeader { expected: String, actual: String },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV record field problem: {0}")]
    BadCsvField(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream {stream} is not supported by tick format {format}")]
    UnsupportedStream { format: String, stream: String },
}
