use thiserror::Error;

/// Error types for the hierkmeans library
#[derive(Error, Debug)]
pub enum KMeansError {
    /// The number of clusters k is invalid (must be in 1..=u16::MAX)
    #[error("Invalid k value: {0}")]
    InvalidK(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No usable seed point could be read from the source
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A record could not be turned into a point
    #[error("Parse error on record {line:?}: {reason}")]
    Parse { line: String, reason: String },

    /// The centroid store blob is missing, short, or inconsistent with the run
    #[error("Centroid store corrupted: {0}")]
    StoreCorruption(String),

    /// Block files could not be concatenated into the round output or deleted
    #[error("Block merge failed: {0}")]
    MergeFailure(String),

    /// Any other filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KMeansError {
    pub(crate) fn parse(line: &str, reason: impl Into<String>) -> Self {
        KMeansError::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
