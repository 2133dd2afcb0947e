use crate::config::KMeansConfig;
use crate::distance::nearest_centroid;
use crate::error::KMeansError;
use crate::path::{BucketKey, ClusterPath};
use crate::point::{Centroid, Point};
use crate::record::read_record;
use crate::store::{CentroidStore, StoreLocation};
use crate::update::PartialSum;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Map side of a round: assigns each record to its nearest centroid.
///
/// Holds a read-only snapshot of the store taken at setup, so any number of
/// tasks can share one stage.
pub struct AssignmentStage {
    store: CentroidStore,
    config: KMeansConfig,
    level: usize,
}

impl AssignmentStage {
    /// Load the store snapshot for `level` from the shared blob
    pub fn setup(
        location: &StoreLocation,
        config: &KMeansConfig,
        level: usize,
        expected: usize,
    ) -> Result<Self, KMeansError> {
        let store = CentroidStore::load(location, config.dims(), level, expected)?;
        Ok(Self::new(store, config.clone()))
    }

    pub fn new(store: CentroidStore, config: KMeansConfig) -> Self {
        let level = store.level();
        Self {
            store,
            config,
            level,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    fn is_final_level(&self) -> bool {
        self.level >= self.config.levels
    }

    /// Nearest centroid to `point` within `bucket`; ties go to the lower position.
    pub fn nearest(&self, point: &Point, bucket: &BucketKey) -> Result<&Centroid, KMeansError> {
        let centroids = self
            .store
            .bucket(bucket)
            .ok_or_else(|| KMeansError::StoreCorruption(format!("no bucket {bucket}")))?;
        nearest_centroid(point, centroids)
            .map(|(centroid, _)| centroid)
            .ok_or_else(|| KMeansError::StoreCorruption(format!("bucket {bucket} is empty")))
    }

    /// Assign one input line.
    ///
    /// Header and blank lines are ignored; `first_line` marks the line at byte
    /// offset 0 of the input. Otherwise the point is folded into the task's
    /// partial sum for the chosen centroid, and the record, tagged with the
    /// extended path, is appended to the task's block file.
    pub fn map_record(
        &self,
        line: &str,
        first_line: bool,
        task: &mut TaskContext,
    ) -> Result<(), KMeansError> {
        let Some((record, point)) = read_record(line, self.level - 1, first_line, &self.config)?
        else {
            return Ok(());
        };

        let chosen = self.nearest(&point, &record.bucket())?;
        let assigned: &ClusterPath = chosen.path();

        let tagged = if self.is_final_level() {
            record.flattened(assigned, self.config.delimiter)
        } else {
            record.tagged(assigned)
        };
        task.emit(assigned, &point, &tagged)
    }
}

/// Per-task state: the lazily created block file and the task's partial sums
pub struct TaskContext {
    block_path: PathBuf,
    block: Option<BufWriter<File>>,
    partials: HashMap<ClusterPath, PartialSum>,
    records: usize,
}

impl TaskContext {
    pub fn new(block_path: impl Into<PathBuf>) -> Self {
        Self {
            block_path: block_path.into(),
            block: None,
            partials: HashMap::new(),
            records: 0,
        }
    }

    pub fn block_path(&self) -> &Path {
        &self.block_path
    }

    fn emit(&mut self, path: &ClusterPath, point: &Point, tagged: &str) -> Result<(), KMeansError> {
        match self.partials.get_mut(path) {
            Some(partial) => partial.add_point(point),
            None => {
                self.partials
                    .insert(path.clone(), PartialSum::from_point(point));
            }
        }

        if self.block.is_none() {
            self.block = Some(BufWriter::new(File::create(&self.block_path)?));
        }
        if let Some(writer) = self.block.as_mut() {
            writer.write_all(tagged.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        self.records += 1;
        Ok(())
    }

    /// Flush the block file and hand back what the task produced
    pub fn finish(self) -> Result<TaskOutput, KMeansError> {
        let block = match self.block {
            Some(mut writer) => {
                writer.flush()?;
                Some(self.block_path)
            }
            None => None,
        };
        Ok(TaskOutput {
            block,
            partials: self.partials,
            records: self.records,
        })
    }
}

/// Output of one assignment task
#[derive(Debug)]
pub struct TaskOutput {
    /// Block file, if the task assigned at least one record
    pub block: Option<PathBuf>,
    pub partials: HashMap<ClusterPath, PartialSum>,
    pub records: usize,
}
