use thiserror::Error;

/// Failures surfaced by the link store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening, reading, or appending to the links file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line in the links file did not split into exactly `key,value`.
    #[error("invalid record on line {line_number}: {line}")]
    InvalidRecord { line_number: usize, line: String },
}
