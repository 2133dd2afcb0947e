use crate::error::KMeansError;
use std::path::PathBuf;

/// Deepest hierarchy a run may request.
///
/// Each level multiplies the seed count by up to `k`, and path elements are
/// stored as `u16`.
pub const MAX_LEVELS: usize = 16;

/// Configuration for a hierarchical k-means run
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters per bucket
    pub k: usize,

    /// Hierarchy depth. `1` is flat k-means.
    pub levels: usize,

    /// Ordered column indexes selecting the coordinate fields of a record
    pub column_positions: Vec<usize>,

    /// Tolerance window used to decide whether an updated centroid moved.
    /// Two centroids are equal when every coordinate pair differs by at most `tol`.
    pub tol: f64,

    /// Maximum number of rounds per level. Set to None to loop until convergence.
    pub max_rounds: Option<usize>,

    /// Field delimiter of input records
    pub delimiter: char,

    /// Substring identifying a header line. When None, a line whose selected
    /// fields are all non-numeric is treated as a header.
    pub header_marker: Option<String>,

    /// Number of records handled by one assignment task
    pub chunk_size_records: usize,

    /// Directory holding the centroid blob, block files and intermediate datasets
    pub work_dir: PathBuf,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 8,
            levels: 1,
            column_positions: vec![0, 1],
            tol: 1.0,
            max_rounds: Some(100),
            delimiter: ',',
            header_marker: None,
            chunk_size_records: 50_000,
            work_dir: std::env::temp_dir().join("hierkmeans"),
        }
    }
}

impl KMeansConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Set the hierarchy depth
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    /// Set the coordinate column positions
    pub fn with_column_positions(mut self, positions: Vec<usize>) -> Self {
        self.column_positions = positions;
        self
    }

    /// Set the tolerance window
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the per-level round cap
    pub fn with_max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the record field delimiter
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the header marker
    pub fn with_header_marker(mut self, marker: Option<String>) -> Self {
        self.header_marker = marker;
        self
    }

    /// Set the number of records per assignment task
    pub fn with_chunk_size_records(mut self, chunk_size: usize) -> Self {
        self.chunk_size_records = chunk_size;
        self
    }

    /// Set the working directory
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Number of coordinates per point
    pub fn dims(&self) -> usize {
        self.column_positions.len()
    }

    /// Check every field for a usable value
    pub fn validate(&self) -> Result<(), KMeansError> {
        if self.k == 0 {
            return Err(KMeansError::InvalidK(
                "k must be greater than 0".to_string(),
            ));
        }
        if self.k > u16::MAX as usize {
            return Err(KMeansError::InvalidK(format!(
                "k must be at most {}, got {}",
                u16::MAX,
                self.k
            )));
        }
        if self.levels == 0 || self.levels > MAX_LEVELS {
            return Err(KMeansError::InvalidConfig(format!(
                "levels must be in 1..={}, got {}",
                MAX_LEVELS, self.levels
            )));
        }
        if self.column_positions.is_empty() {
            return Err(KMeansError::InvalidConfig(
                "at least one column position is required".to_string(),
            ));
        }
        if self.tol.is_nan() || self.tol < 0.0 {
            return Err(KMeansError::InvalidConfig(format!(
                "tol must be a non-negative number, got {}",
                self.tol
            )));
        }
        if self.max_rounds == Some(0) {
            return Err(KMeansError::InvalidConfig(
                "max_rounds must allow at least one round".to_string(),
            ));
        }
        if self.chunk_size_records == 0 {
            return Err(KMeansError::InvalidConfig(
                "chunk_size_records must be greater than 0".to_string(),
            ));
        }
        if self.delimiter == ':' {
            return Err(KMeansError::InvalidConfig(
                "':' is reserved for path tags and cannot be the field delimiter".to_string(),
            ));
        }
        Ok(())
    }
}
