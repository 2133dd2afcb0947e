use crate::assignment::AssignmentStage;
use crate::config::KMeansConfig;
use crate::error::KMeansError;
use crate::fabric::Fabric;
use crate::store::{CentroidStore, StoreLocation};
use crate::update::UpdateStage;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// State of one level's stabilization loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelState {
    Running,
    Converged,
}

/// Summary of one hierarchy level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelReport {
    pub level: usize,
    pub rounds: usize,
    /// False when the round cap stopped the level first
    pub converged: bool,
    pub centroids: usize,
    pub buckets: usize,
    /// Change count reported by the last round
    pub last_changes: u64,
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub levels: Vec<LevelReport>,
    /// Store of the last level, as persisted by its last round
    pub store: CentroidStore,
}

impl RunReport {
    pub fn total_rounds(&self) -> usize {
        self.levels.iter().map(|l| l.rounds).sum()
    }

    pub fn converged(&self) -> bool {
        self.levels.iter().all(|l| l.converged)
    }
}

/// Repeats assignment and update rounds over one level's input until no centroid moves.
pub struct StabilizationController<'a, F: Fabric> {
    fabric: &'a F,
    location: &'a StoreLocation,
    config: &'a KMeansConfig,
    level: usize,
    expected: usize,
}

impl<'a, F: Fabric> StabilizationController<'a, F> {
    /// `expected` is the number of centroids currently persisted for `level`.
    pub fn new(
        fabric: &'a F,
        location: &'a StoreLocation,
        config: &'a KMeansConfig,
        level: usize,
        expected: usize,
    ) -> Self {
        Self {
            fabric,
            location,
            config,
            level,
            expected,
        }
    }

    /// Run rounds until one reports zero changes, or until the round cap.
    ///
    /// Each round reads `input` in full and rewrites `output`. A round starts
    /// only after the previous one has persisted the store and merged its blocks.
    pub fn run(&self, input: &Path, output: &Path) -> Result<(LevelReport, CentroidStore), KMeansError> {
        let mut state = LevelState::Running;
        let mut first_round = true;
        let mut changes: u64 = 0;
        let mut rounds = 0;
        let mut store = None;

        while first_round || changes > 0 {
            if let Some(max_rounds) = self.config.max_rounds {
                if rounds >= max_rounds {
                    warn!(
                        level = self.level,
                        rounds,
                        changes,
                        "round cap reached before convergence"
                    );
                    break;
                }
            }
            first_round = false;
            rounds += 1;

            let round_start = Instant::now();
            let mapper = AssignmentStage::setup(self.location, self.config, self.level, self.expected)?;
            let reducer = UpdateStage::setup(self.location, self.config, self.level, self.expected)?;
            let outcome = self.fabric.submit(&mapper, reducer, input, output)?;

            changes = outcome.changes;
            info!(
                level = self.level,
                round = rounds,
                changes,
                records = outcome.records,
                tasks = outcome.tasks,
                elapsed_ms = round_start.elapsed().as_millis() as u64,
                "stabilization round finished"
            );
            store = Some(outcome.store);

            if changes == 0 {
                state = LevelState::Converged;
            }
        }

        let store = store.ok_or_else(|| {
            KMeansError::InvalidConfig("max_rounds must allow at least one round".to_string())
        })?;
        let report = LevelReport {
            level: self.level,
            rounds,
            converged: state == LevelState::Converged,
            centroids: store.len(),
            buckets: store.bucket_count(),
            last_changes: changes,
        };
        Ok((report, store))
    }
}

/// Drives levels `1..=H`, re-seeding the store from each level's merged output.
pub struct HierarchyController<'a, F: Fabric> {
    fabric: &'a F,
    location: &'a StoreLocation,
    config: &'a KMeansConfig,
}

impl<'a, F: Fabric> HierarchyController<'a, F> {
    pub fn new(fabric: &'a F, location: &'a StoreLocation, config: &'a KMeansConfig) -> Self {
        Self {
            fabric,
            location,
            config,
        }
    }

    fn even_dataset(&self) -> PathBuf {
        self.config.work_dir.join("intermediate-even")
    }

    fn odd_dataset(&self) -> PathBuf {
        self.config.work_dir.join("intermediate-odd")
    }

    /// Source and destination of `level`.
    ///
    /// Level 1 reads the input, level H writes the final output, and the two
    /// intermediates alternate by parity so a level never reads what it writes.
    pub fn datasets_for(&self, level: usize, input: &Path, output: &Path) -> (PathBuf, PathBuf) {
        let source = match level {
            1 => input.to_path_buf(),
            l if l % 2 == 0 => self.even_dataset(),
            _ => self.odd_dataset(),
        };
        let destination = if level == self.config.levels {
            output.to_path_buf()
        } else if level % 2 == 1 {
            self.even_dataset()
        } else {
            self.odd_dataset()
        };
        (source, destination)
    }

    /// Cluster `input` into `output`. The intermediates are removed whether or not the run succeeds.
    pub fn run(&self, input: &Path, output: &Path) -> Result<RunReport, KMeansError> {
        self.config.validate()?;
        fs::create_dir_all(&self.config.work_dir)?;

        let result = self.run_levels(input, output);
        let cleanup = self.remove_intermediates();
        let report = result?;
        cleanup?;
        Ok(report)
    }

    fn run_levels(&self, input: &Path, output: &Path) -> Result<RunReport, KMeansError> {
        let run_start = Instant::now();
        let mut store = self.seed(input, 1, 1)?;
        let mut reports = Vec::with_capacity(self.config.levels);

        for level in 1..=self.config.levels {
            info!(
                level,
                centroids = store.len(),
                buckets = store.bucket_count(),
                "hierarchy level started"
            );
            let (source, destination) = self.datasets_for(level, input, output);

            let (report, converged_store) =
                StabilizationController::new(self.fabric, self.location, self.config, level, store.len())
                    .run(&source, &destination)?;
            info!(
                level,
                rounds = report.rounds,
                converged = report.converged,
                "hierarchy level finished"
            );
            reports.push(report);

            if level == self.config.levels {
                store = converged_store;
                break;
            }
            // Every centroid of this level becomes the parent bucket of the next.
            store = self.seed(&destination, level + 1, converged_store.len())?;
        }

        info!(
            levels = reports.len(),
            elapsed_s = run_start.elapsed().as_secs_f64(),
            "clustering finished"
        );
        Ok(RunReport {
            levels: reports,
            store,
        })
    }

    fn seed(&self, source: &Path, level: usize, expected_buckets: usize) -> Result<CentroidStore, KMeansError> {
        let reader = BufReader::new(File::open(source)?);
        let store = CentroidStore::initiate_from(reader, self.config, level, expected_buckets)?;
        store.persist(self.location)?;
        debug!(level, blob = self.location.uri(), "seed store persisted");
        Ok(store)
    }

    fn remove_intermediates(&self) -> Result<(), KMeansError> {
        for path in [self.even_dataset(), self.odd_dataset()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::fabric::LocalFabric;
    use crate::path::{BucketKey, ClusterPath};
    use crate::point::Point;
    use std::sync::Arc;

    fn location() -> StoreLocation {
        StoreLocation::new(Arc::new(MemoryBlobStore::new()), "centroids")
    }

    fn square_input(dir: &Path) -> PathBuf {
        let input = dir.join("square.csv");
        fs::write(&input, "x,y\n0,0\n10,10\n0,10\n10,0\n").unwrap();
        input
    }

    fn seed_store(location: &StoreLocation, seeds: &[[f64; 2]]) -> usize {
        let mut store = CentroidStore::new(1);
        for s in seeds {
            store.push(BucketKey::root(), Point::new(s.to_vec())).unwrap();
        }
        store.persist(location).unwrap();
        store.len()
    }

    #[test]
    fn test_square_with_diagonal_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = square_input(dir.path());
        let config = KMeansConfig::new(2).with_work_dir(dir.path());
        let fabric = LocalFabric::from_config(&config);
        let location = location();
        let expected = seed_store(&location, &[[0.0, 0.0], [10.0, 10.0]]);

        let output = dir.path().join("out");
        let (report, store) = StabilizationController::new(&fabric, &location, &config, 1, expected)
            .run(&input, &output)
            .unwrap();

        // (0,10) and (10,0) are equidistant from both seeds and go to position 0.
        assert_eq!(report.rounds, 2);
        assert!(report.converged);
        assert_eq!(report.last_changes, 0);
        let root = store.bucket(&BucketKey::root()).unwrap();
        approx::assert_relative_eq!(root[0].point().coords()[0], 10.0 / 3.0);
        approx::assert_relative_eq!(root[0].point().coords()[1], 10.0 / 3.0);
        assert_eq!(root[1].point(), &Point::new(vec![10.0, 10.0]));
    }

    #[test]
    fn test_square_with_column_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = square_input(dir.path());
        let config = KMeansConfig::new(2).with_work_dir(dir.path());
        let fabric = LocalFabric::from_config(&config);
        let location = location();
        let expected = seed_store(&location, &[[0.0, 1.0], [10.0, 9.0]]);

        let output = dir.path().join("out");
        let (report, store) = StabilizationController::new(&fabric, &location, &config, 1, expected)
            .run(&input, &output)
            .unwrap();

        assert_eq!(report.rounds, 2);
        assert!(report.converged);
        let root = store.bucket(&BucketKey::root()).unwrap();
        assert_eq!(root[0].point(), &Point::new(vec![0.0, 5.0]));
        assert_eq!(root[1].point(), &Point::new(vec![10.0, 5.0]));
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "0,0,0\n10,10,1\n0,10,0\n10,0,1\n"
        );
    }

    #[test]
    fn test_round_cap_stops_level() {
        let dir = tempfile::tempdir().unwrap();
        let input = square_input(dir.path());
        let config = KMeansConfig::new(2)
            .with_work_dir(dir.path())
            .with_max_rounds(Some(1));
        let fabric = LocalFabric::from_config(&config);
        let location = location();
        let expected = seed_store(&location, &[[0.0, 1.0], [10.0, 9.0]]);

        let (report, _) = StabilizationController::new(&fabric, &location, &config, 1, expected)
            .run(&input, &dir.path().join("out"))
            .unwrap();

        assert_eq!(report.rounds, 1);
        assert!(!report.converged);
        assert_eq!(report.last_changes, 2);
    }

    #[test]
    fn test_centroid_without_points_keeps_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("line.csv");
        fs::write(&input, "4,0\n5.5,0\n14.5,0\n16,0\n").unwrap();

        let config = KMeansConfig::new(3)
            .with_levels(2)
            .with_tol(0.1)
            .with_work_dir(dir.path());
        let fabric = LocalFabric::from_config(&config);
        let location = location();
        let expected = seed_store(&location, &[[0.0, 0.0], [10.0, 0.0], [20.0, 0.0]]);

        // Round 1 gives the middle centroid the two inner points; once its
        // neighbours move in, round 2 leaves it with none.
        let level_one = dir.path().join("level-1");
        let (report, store) = StabilizationController::new(&fabric, &location, &config, 1, expected)
            .run(&input, &level_one)
            .unwrap();

        assert!(report.converged);
        assert_eq!(report.rounds, 3);
        let root = store.bucket(&BucketKey::root()).unwrap();
        assert_eq!(root[1].point(), &Point::new(vec![10.0, 0.0]));
        approx::assert_relative_eq!(root[0].point().coords()[0], 4.75);
        approx::assert_relative_eq!(root[2].point().coords()[0], 15.25);
        assert_eq!(
            fs::read_to_string(&level_one).unwrap(),
            "4,0:0\n5.5,0:0\n14.5,0:2\n16,0:2\n"
        );

        // The empty centroid opens no bucket at the next level.
        let seeded = CentroidStore::initiate_from(
            BufReader::new(File::open(&level_one).unwrap()),
            &config,
            2,
            store.len(),
        )
        .unwrap();
        assert_eq!(seeded.bucket_count(), 2);
        assert_eq!(seeded.len(), 4);
        assert!(seeded
            .bucket(&ClusterPath::from_indexes(vec![1]).as_bucket())
            .is_none());

        seeded.persist(&location).unwrap();
        let output = dir.path().join("level-2");
        let (report, _) = StabilizationController::new(&fabric, &location, &config, 2, seeded.len())
            .run(&level_one, &output)
            .unwrap();
        assert!(report.converged);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "4,0,0,0\n5.5,0,0,1\n14.5,0,2,0\n16,0,2,1\n"
        );
    }

    #[test]
    fn test_dataset_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let config = KMeansConfig::new(2).with_levels(4).with_work_dir(dir.path());
        let fabric = LocalFabric::from_config(&config);
        let location = location();
        let controller = HierarchyController::new(&fabric, &location, &config);

        let input = Path::new("in");
        let output = Path::new("out");
        let even = dir.path().join("intermediate-even");
        let odd = dir.path().join("intermediate-odd");

        assert_eq!(controller.datasets_for(1, input, output), (input.to_path_buf(), even.clone()));
        assert_eq!(controller.datasets_for(2, input, output), (even.clone(), odd.clone()));
        assert_eq!(controller.datasets_for(3, input, output), (odd.clone(), even.clone()));
        assert_eq!(controller.datasets_for(4, input, output), (even, output.to_path_buf()));
    }

    #[test]
    fn test_hierarchy_builds_two_levels() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        // Two far-apart groups, each made of two tight pairs.
        fs::write(
            &input,
            "x,y\n0,0\n100,100\n20,0\n120,100\n0,1\n100,101\n20,1\n120,101\n",
        )
        .unwrap();

        let config = KMeansConfig::new(2)
            .with_levels(2)
            .with_work_dir(dir.path().join("work"));
        let fabric = LocalFabric::from_config(&config);
        let location = location();
        let output = dir.path().join("out");

        let report = HierarchyController::new(&fabric, &location, &config)
            .run(&input, &output)
            .unwrap();

        assert_eq!(report.levels.len(), 2);
        assert!(report.converged());
        assert_eq!(report.store.level(), 2);
        assert_eq!(report.store.len(), 4);
        assert_eq!(report.store.bucket_count(), 2);

        let lines: Vec<String> = fs::read_to_string(&output)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines.len(), 8);
        // Each line: x, y, level-1 index, level-2 index
        for line in &lines {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 4);
        }
        let top = |line: &str| line.split(',').nth(2).unwrap().to_string();
        let leaf = |line: &str| line.split(',').nth(3).unwrap().to_string();
        assert_eq!(lines[0], "0,0,0,0");
        assert_eq!(top(&lines[0]), top(&lines[2]));
        assert_eq!(top(&lines[0]), top(&lines[4]));
        assert_ne!(top(&lines[0]), top(&lines[1]));
        assert_eq!(leaf(&lines[0]), leaf(&lines[4]));
        assert_ne!(leaf(&lines[0]), leaf(&lines[2]));

        assert!(!dir.path().join("work/intermediate-even").exists());
        assert!(!dir.path().join("work/intermediate-odd").exists());
    }
}
