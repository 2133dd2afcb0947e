use crate::algorithm::{HierarchyController, RunReport};
use crate::blob::{BlobStore, FsBlobStore};
use crate::config::KMeansConfig;
use crate::error::KMeansError;
use crate::fabric::{Fabric, LocalFabric};
use crate::store::{CentroidStore, StoreLocation};
use std::path::Path;
use std::sync::Arc;

/// Name of the centroid blob inside the working directory
pub const CENTROID_BLOB: &str = "centroids";

/// Flat or hierarchical k-means over a delimited text file.
///
/// Each level runs rounds of nearest-centroid assignment and mean update until
/// no centroid moves outside the tolerance window. With `levels > 1`, every
/// converged centroid is then split into up to `k` children at the next level.
///
/// # Example
///
/// ```
/// use hierkmeans_rs::{HierarchicalKMeans, KMeansConfig};
///
/// let dir = tempfile::tempdir().unwrap();
/// let input = dir.path().join("points.csv");
/// std::fs::write(&input, "x,y\n0,0\n0,1\n9,9\n9,8\n").unwrap();
///
/// let config = KMeansConfig::new(2)
///     .with_column_positions(vec![0, 1])
///     .with_work_dir(dir.path().join("work"));
/// let mut kmeans = HierarchicalKMeans::with_config(config);
/// let report = kmeans.fit(&input, &dir.path().join("clusters.csv")).unwrap();
///
/// assert!(report.converged());
/// assert_eq!(kmeans.centroids().unwrap().len(), 2);
/// ```
pub struct HierarchicalKMeans {
    /// Model configuration
    config: KMeansConfig,

    /// Final-level centroids (None if not yet fitted)
    centroids: Option<CentroidStore>,
}

impl HierarchicalKMeans {
    /// Create a new instance with `k` clusters per bucket over `levels` levels.
    ///
    /// # Panics
    ///
    /// Panics if `k` is 0.
    pub fn new(k: usize, levels: usize) -> Self {
        assert!(k > 0, "k must be greater than 0");

        Self {
            config: KMeansConfig::new(k).with_levels(levels),
            centroids: None,
        }
    }

    /// Create a new instance with custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.k` is 0.
    pub fn with_config(config: KMeansConfig) -> Self {
        assert!(config.k > 0, "k must be greater than 0");

        Self {
            config,
            centroids: None,
        }
    }

    /// Cluster `input` into `output` with the in-process fabric and a
    /// filesystem blob under the configured working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a record is
    /// malformed, or any round fails. A failed run leaves the last
    /// successfully persisted centroid blob untouched.
    pub fn fit(&mut self, input: &Path, output: &Path) -> Result<RunReport, KMeansError> {
        let fabric = LocalFabric::from_config(&self.config);
        let blob: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&self.config.work_dir));
        self.fit_with(&fabric, blob, input, output)
    }

    /// Cluster `input` into `output` on a caller-supplied fabric and blob store.
    pub fn fit_with<F: Fabric>(
        &mut self,
        fabric: &F,
        blob: Arc<dyn BlobStore>,
        input: &Path,
        output: &Path,
    ) -> Result<RunReport, KMeansError> {
        let location = StoreLocation::new(blob, CENTROID_BLOB);
        let report = HierarchyController::new(fabric, &location, &self.config).run(input, output)?;

        self.centroids = Some(report.store.clone());
        Ok(report)
    }

    /// Get the final-level centroids of the fitted model.
    ///
    /// # Returns
    ///
    /// Returns `Some(&CentroidStore)` if the model has been fitted, `None` otherwise.
    pub fn centroids(&self) -> Option<&CentroidStore> {
        self.centroids.as_ref()
    }

    /// Get the number of clusters per bucket.
    pub fn k(&self) -> usize {
        self.config.k
    }

    /// Get the hierarchy depth.
    pub fn levels(&self) -> usize {
        self.config.levels
    }

    /// Get the configuration.
    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    #[test]
    fn test_hierarchical_kmeans_new() {
        let kmeans = HierarchicalKMeans::new(10, 3);
        assert_eq!(kmeans.k(), 10);
        assert_eq!(kmeans.levels(), 3);
        assert!(kmeans.centroids().is_none());
    }

    #[test]
    #[should_panic(expected = "k must be greater than 0")]
    fn test_hierarchical_kmeans_k_zero() {
        let _ = HierarchicalKMeans::new(0, 1);
    }

    #[test]
    fn test_fit_sets_centroids_and_blob() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "1,1\n2,2\n50,50\n51,51\n").unwrap();

        let config = KMeansConfig::new(2).with_work_dir(dir.path().join("work"));
        let mut kmeans = HierarchicalKMeans::with_config(config);
        let report = kmeans.fit(&input, &dir.path().join("out.csv")).unwrap();

        assert_eq!(report.levels.len(), 1);
        assert_eq!(kmeans.centroids().unwrap(), &report.store);
        let blob = std::fs::read_to_string(dir.path().join("work").join(CENTROID_BLOB)).unwrap();
        assert_eq!(blob, report.store.serialize());
    }

    #[test]
    fn test_fit_with_memory_blob() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "1,1\n2,2\n50,50\n51,51\n").unwrap();

        let config = KMeansConfig::new(2).with_work_dir(dir.path().join("work"));
        let fabric = LocalFabric::from_config(&config);
        let blob = Arc::new(MemoryBlobStore::new());
        let mut kmeans = HierarchicalKMeans::with_config(config);

        kmeans
            .fit_with(&fabric, blob.clone(), &input, &dir.path().join("out.csv"))
            .unwrap();
        let stored = String::from_utf8(blob.get(CENTROID_BLOB).unwrap()).unwrap();
        assert_eq!(stored, kmeans.centroids().unwrap().serialize());
    }

    #[test]
    fn test_fit_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = KMeansConfig::new(2)
            .with_levels(0)
            .with_work_dir(dir.path());
        let mut kmeans = HierarchicalKMeans::with_config(config);
        let result = kmeans.fit(&dir.path().join("in"), &dir.path().join("out"));
        assert!(matches!(result, Err(KMeansError::InvalidConfig(_))));
        assert!(kmeans.centroids().is_none());
    }
}
