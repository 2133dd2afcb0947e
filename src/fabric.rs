//! Execution of one round as a barrier-synchronized data-parallel pass.

use crate::assignment::{AssignmentStage, TaskContext, TaskOutput};
use crate::config::KMeansConfig;
use crate::error::KMeansError;
use crate::path::ClusterPath;
use crate::store::CentroidStore;
use crate::update::{PartialSum, UpdateStage};
use rayon::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// What the controller learns once a round has fully completed
#[derive(Debug)]
pub struct RoundOutcome {
    /// Centroids that moved outside the tolerance window
    pub changes: u64,
    /// Records assigned (headers and blank lines excluded)
    pub records: usize,
    /// Assignment tasks run
    pub tasks: usize,
    /// Store as persisted at the end of the round
    pub store: CentroidStore,
}

/// Runs one round: every assignment task, a barrier, then the single aggregation task
pub trait Fabric {
    /// Blocks until the round is complete, including the store write and block merge.
    fn submit(
        &self,
        mapper: &AssignmentStage,
        reducer: UpdateStage,
        input: &Path,
        output: &Path,
    ) -> Result<RoundOutcome, KMeansError>;
}

/// In-process fabric running assignment tasks on the rayon thread pool.
///
/// The input is cut into tasks of `chunk_size_records` lines. Each task's
/// block file is named after the byte offset of its first line, so merging
/// blocks in name order reproduces input order.
#[derive(Debug)]
pub struct LocalFabric {
    chunk_size_records: usize,
    scratch_dir: PathBuf,
    submissions: AtomicUsize,
}

impl LocalFabric {
    pub fn new(chunk_size_records: usize, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunk_size_records: chunk_size_records.max(1),
            scratch_dir: scratch_dir.into(),
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &KMeansConfig) -> Self {
        Self::new(config.chunk_size_records, config.work_dir.join("blocks"))
    }

    fn run_round(
        &self,
        mapper: &AssignmentStage,
        mut reducer: UpdateStage,
        input: &Path,
        output: &Path,
        round_dir: &Path,
    ) -> Result<RoundOutcome, KMeansError> {
        let reader = BufReader::new(File::open(input)?);
        let splits = SplitReader::new(reader, self.chunk_size_records);

        let mut results: Vec<(u64, Result<TaskOutput, KMeansError>)> = splits
            .par_bridge()
            .map(|split| match split {
                Ok(split) => (split.offset, run_task(mapper, split, round_dir)),
                Err(e) => (u64::MAX, Err(e.into())),
            })
            .collect();
        results.sort_by_key(|(offset, _)| *offset);

        // Barrier: every task has completed.
        let mut outputs = Vec::with_capacity(results.len());
        for (_, result) in results {
            outputs.push(result?);
        }

        let tasks = outputs.len();
        let mut records = 0;
        let mut blocks = Vec::with_capacity(tasks);
        let mut grouped: BTreeMap<ClusterPath, PartialSum> = BTreeMap::new();
        for out in outputs {
            records += out.records;
            blocks.extend(out.block);
            for (path, partial) in out.partials {
                match grouped.entry(path) {
                    Entry::Vacant(slot) => {
                        slot.insert(partial);
                    }
                    Entry::Occupied(mut slot) => slot.get_mut().merge(&partial),
                }
            }
        }

        for (path, group) in &grouped {
            reducer.reduce(path, group)?;
        }
        let changes = reducer.changes();
        let store = reducer.cleanup(&blocks, output)?;

        Ok(RoundOutcome {
            changes,
            records,
            tasks,
            store,
        })
    }
}

impl Fabric for LocalFabric {
    fn submit(
        &self,
        mapper: &AssignmentStage,
        reducer: UpdateStage,
        input: &Path,
        output: &Path,
    ) -> Result<RoundOutcome, KMeansError> {
        let n = self.submissions.fetch_add(1, Ordering::Relaxed);
        let round_dir = self.scratch_dir.join(format!("round-{n:06}"));
        fs::create_dir_all(&round_dir)?;

        let result = self.run_round(mapper, reducer, input, output, &round_dir);

        // Holds leftover blocks only when the round failed.
        if let Err(e) = fs::remove_dir_all(&round_dir) {
            warn!(
                dir = %round_dir.display(),
                error = %e,
                "round scratch directory not removed"
            );
        }
        result
    }
}

fn run_task(
    mapper: &AssignmentStage,
    split: InputSplit,
    round_dir: &Path,
) -> Result<TaskOutput, KMeansError> {
    let mut task = TaskContext::new(round_dir.join(format!("block-{:020}", split.offset)));
    for (i, line) in split.lines.iter().enumerate() {
        mapper.map_record(line, split.offset == 0 && i == 0, &mut task)?;
    }
    let out = task.finish()?;
    debug!(
        offset = split.offset,
        records = out.records,
        centroids = out.partials.len(),
        "assignment task finished"
    );
    Ok(out)
}

/// A run of consecutive input lines handed to one task
struct InputSplit {
    offset: u64,
    lines: Vec<String>,
}

/// Cuts a line source into splits of at most `chunk` lines
struct SplitReader<R> {
    reader: R,
    chunk: usize,
    offset: u64,
    done: bool,
}

impl<R: BufRead> SplitReader<R> {
    fn new(reader: R, chunk: usize) -> Self {
        Self {
            reader,
            chunk,
            offset: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for SplitReader<R> {
    type Item = io::Result<InputSplit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let start = self.offset;
        let mut lines = Vec::with_capacity(self.chunk.min(4096));
        let mut buf = String::new();
        while lines.len() < self.chunk {
            buf.clear();
            match self.reader.read_line(&mut buf) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(n) => {
                    self.offset += n as u64;
                    lines.push(buf.trim_end_matches(|c| c == '\n' || c == '\r').to_string());
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if lines.is_empty() {
            None
        } else {
            Some(Ok(InputSplit {
                offset: start,
                lines,
            }))
        }
    }
}
