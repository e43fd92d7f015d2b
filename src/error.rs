use thiserror::Error;

/// Errors raised while loading the reference table or processing an input file.
#[derive(Debug, Error)]
pub enum CqiError {
    #[error("reference table not found: {0}")]
    ReferenceNotFound(String),

    #[error("invalid reference table: {0}")]
    InvalidReference(String),

    #[error("Column '{column}' not found in the file. Available columns: {}", .available.join(", "))]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Column '{column}' row {row}: '{value}' is not a number")]
    NonNumericIndex {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("{name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("{input}: output {output} was already written by another input in this run")]
    OutputCollision { input: String, output: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Spreadsheet(#[from] calamine::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CqiError>;
