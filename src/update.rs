use crate::config::KMeansConfig;
use crate::distance::{max_shift, within_tolerance};
use crate::error::KMeansError;
use crate::merge::merge_blocks;
use crate::path::ClusterPath;
use crate::point::{Centroid, Point};
use crate::store::{CentroidStore, StoreLocation};
use ndarray::Array1;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Running coordinate sum and point count for one centroid path.
///
/// Tasks fold their points into one partial per path before the shuffle, and
/// the aggregation step merges partials from every task.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSum {
    sum: Array1<f64>,
    count: usize,
}

impl PartialSum {
    pub fn from_point(point: &Point) -> Self {
        Self {
            sum: point.coords().to_owned(),
            count: 1,
        }
    }

    pub fn add_point(&mut self, point: &Point) {
        self.sum += &point.coords();
        self.count += 1;
    }

    pub fn merge(&mut self, other: &PartialSum) {
        self.sum += &other.sum;
        self.count += other.count;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Arithmetic mean of every point folded in
    pub fn mean(&self) -> Point {
        Point::from_array(&self.sum / self.count.max(1) as f64)
    }
}

/// Aggregation side of a round: recomputes centroids and counts the ones that moved.
///
/// Owns a private copy of the store loaded at setup. It is the only writer of
/// the shared blob, once, in [`UpdateStage::cleanup`].
pub struct UpdateStage {
    store: CentroidStore,
    location: StoreLocation,
    tol: f64,
    changes: u64,
    groups: usize,
}

impl UpdateStage {
    /// Load the current store from the shared blob
    pub fn setup(
        location: &StoreLocation,
        config: &KMeansConfig,
        level: usize,
        expected: usize,
    ) -> Result<Self, KMeansError> {
        let store = CentroidStore::load(location, config.dims(), level, expected)?;
        Ok(Self::new(store, location.clone(), config.tol))
    }

    pub fn new(store: CentroidStore, location: StoreLocation, tol: f64) -> Self {
        Self {
            store,
            location,
            tol,
            changes: 0,
            groups: 0,
        }
    }

    /// Fold all points assigned to `path` into a new centroid.
    ///
    /// # Returns
    ///
    /// `true` if the new mean lies outside the tolerance window of the stored
    /// centroid, in which case the slot is overwritten and the change counter
    /// incremented.
    pub fn reduce(&mut self, path: &ClusterPath, group: &PartialSum) -> Result<bool, KMeansError> {
        self.groups += 1;
        let candidate = group.mean();

        let stored = self.store.get(path).ok_or_else(|| {
            KMeansError::StoreCorruption(format!("assignment produced unknown centroid {path}"))
        })?;
        if within_tolerance(&stored.point().coords(), &candidate.coords(), self.tol) {
            return Ok(false);
        }

        trace!(
            %path,
            points = group.count(),
            shift = max_shift(&stored.point().coords(), &candidate.coords()),
            "centroid moved"
        );
        self.store.replace(Centroid::new(candidate, path.clone()))?;
        self.changes += 1;
        Ok(true)
    }

    /// Number of centroids that moved this round
    pub fn changes(&self) -> u64 {
        self.changes
    }

    pub fn store(&self) -> &CentroidStore {
        &self.store
    }

    /// End of round: persist the store, then merge this round's blocks into `output`.
    pub fn cleanup(self, blocks: &[PathBuf], output: &Path) -> Result<CentroidStore, KMeansError> {
        self.store.persist(&self.location)?;
        merge_blocks(blocks, output)?;

        debug!(
            groups = self.groups,
            changes = self.changes,
            blocks = blocks.len(),
            "round aggregation finished"
        );
        Ok(self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::path::BucketKey;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn stage(points: &[[f64; 2]], tol: f64) -> UpdateStage {
        let mut store = CentroidStore::new(1);
        for p in points {
            store.push(BucketKey::root(), Point::new(p.to_vec())).unwrap();
        }
        let location = StoreLocation::new(Arc::new(MemoryBlobStore::new()), "centroids");
        UpdateStage::new(store, location, tol)
    }

    fn group(points: &[[f64; 2]]) -> PartialSum {
        let mut iter = points.iter().map(|p| Point::new(p.to_vec()));
        let mut partial = PartialSum::from_point(&iter.next().unwrap());
        for p in iter {
            partial.add_point(&p);
        }
        partial
    }

    #[test]
    fn test_partial_sum_mean() {
        let partial = group(&[[0.0, 0.0], [0.0, 10.0], [3.0, 2.0]]);
        assert_eq!(partial.count(), 3);
        let mean = partial.mean();
        assert_relative_eq!(mean.coords()[0], 1.0);
        assert_relative_eq!(mean.coords()[1], 4.0);
    }

    #[test]
    fn test_partial_sum_merge_matches_single_pass() {
        let all = group(&[[1.0, 2.0], [3.0, 4.0], [5.0, 9.0], [7.0, 1.0]]);
        let mut left = group(&[[1.0, 2.0], [3.0, 4.0]]);
        left.merge(&group(&[[5.0, 9.0], [7.0, 1.0]]));
        assert_eq!(left, all);
    }

    #[test]
    fn test_reduce_counts_moved_centroids() {
        let mut update = stage(&[[0.0, 1.0], [10.0, 9.0]], 1.0);
        let c0 = ClusterPath::root().child(0);
        let c1 = ClusterPath::root().child(1);

        assert!(update.reduce(&c0, &group(&[[0.0, 0.0], [0.0, 10.0]])).unwrap());
        assert!(update.reduce(&c1, &group(&[[10.0, 10.0], [10.0, 0.0]])).unwrap());
        assert_eq!(update.changes(), 2);
        assert_eq!(
            update.store().get(&c0).unwrap().point(),
            &Point::new(vec![0.0, 5.0])
        );
    }

    #[test]
    fn test_reduce_within_tolerance_keeps_stored() {
        let mut update = stage(&[[0.0, 0.0]], 1.0);
        let c0 = ClusterPath::root().child(0);

        assert!(!update.reduce(&c0, &group(&[[0.5, -1.0]])).unwrap());
        assert_eq!(update.changes(), 0);
        assert_eq!(
            update.store().get(&c0).unwrap().point(),
            &Point::new(vec![0.0, 0.0])
        );
    }

    #[test]
    fn test_tolerance_is_tunable() {
        let c0 = ClusterPath::root().child(0);
        let moved = group(&[[3.0, 3.0]]);

        let mut strict = stage(&[[0.0, 0.0]], 1.0);
        assert!(strict.reduce(&c0, &moved).unwrap());

        let mut loose = stage(&[[0.0, 0.0]], 5.0);
        assert!(!loose.reduce(&c0, &moved).unwrap());
    }

    #[test]
    fn test_reduce_unknown_path_fails() {
        let mut update = stage(&[[0.0, 0.0]], 1.0);
        let result = update.reduce(&ClusterPath::root().child(3), &group(&[[1.0, 1.0]]));
        assert!(matches!(result, Err(KMeansError::StoreCorruption(_))));
    }

    #[test]
    fn test_cleanup_persists_and_merges() {
        let dir = tempfile::tempdir().unwrap();
        let blob = Arc::new(MemoryBlobStore::new());
        let location = StoreLocation::new(blob, "centroids");

        let mut store = CentroidStore::new(1);
        store.push(BucketKey::root(), Point::new(vec![0.0, 0.0])).unwrap();
        let mut update = UpdateStage::new(store, location.clone(), 1.0);
        update
            .reduce(&ClusterPath::root().child(0), &group(&[[4.0, 4.0]]))
            .unwrap();

        let block = dir.path().join("block-0");
        std::fs::write(&block, "4,4,0\n").unwrap();
        let output = dir.path().join("out");
        let store = update.cleanup(&[block.clone()], &output).unwrap();

        let persisted = CentroidStore::load(&location, 2, 1, 1).unwrap();
        assert_eq!(persisted, store);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "4,4,0\n");
        assert!(!block.exists());
    }
}
