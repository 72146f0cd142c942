use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("snapshot is missing required column `{0}`")]
    MissingColumn(String),
    #[error("column `{column}` has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("{count} rows failed validation (first at row {first_row}: {reason})")]
    InvalidRows {
        count: usize,
        first_row: usize,
        reason: String,
    },
}
