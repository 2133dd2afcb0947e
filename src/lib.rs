//! # hierkmeans-rs
//!
//! Flat and hierarchical k-means over large delimited text record sets,
//! executed as a sequence of barrier-synchronized data-parallel rounds.
//!
//! ## Features
//!
//! - **Round-based refinement**: every round is a map pass (nearest-centroid
//!   assignment) followed by a single aggregation pass (mean update with
//!   change detection). Only the centroid store crosses round boundaries.
//! - **Hierarchical mode**: with `levels > 1`, each converged cluster is split
//!   into up to `k` children, producing a tree addressed by typed paths.
//! - **Pluggable execution**: rounds go through the [`Fabric`] trait and the
//!   store through the [`BlobStore`] trait. [`LocalFabric`] runs tasks on the
//!   rayon thread pool.
//! - **Partial sums**: tasks fold their points per centroid before the shuffle.
//!
//! ## Example
//!
//! ```rust
//! use hierkmeans_rs::{HierarchicalKMeans, KMeansConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let input = dir.path().join("cities.csv");
//! std::fs::write(
//!     &input,
//!     "Country,City,Latitude,Longitude\n\
//!      fr,paris,48.86,2.35\n\
//!      fr,lyon,45.76,4.83\n\
//!      us,boston,42.36,-71.06\n\
//!      us,newyork,40.71,-74.01\n",
//! )
//! .unwrap();
//!
//! let config = KMeansConfig::new(2)
//!     .with_column_positions(vec![2, 3])
//!     .with_tol(5.0)
//!     .with_work_dir(dir.path().join("work"));
//!
//! let mut kmeans = HierarchicalKMeans::with_config(config);
//! let output = dir.path().join("clusters.csv");
//! kmeans.fit(&input, &output).unwrap();
//!
//! // Each output line is the original record followed by its cluster index.
//! let clustered = std::fs::read_to_string(&output).unwrap();
//! assert_eq!(clustered.lines().count(), 4);
//! ```
//!
//! ## Hierarchical Clustering
//!
//! ```rust
//! use hierkmeans_rs::{HierarchicalKMeans, KMeansConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let input = dir.path().join("points.csv");
//! let mut data = String::new();
//! for i in 0..64 {
//!     data.push_str(&format!("{},{}\n", (i % 8) * 10, (i / 8) * 10));
//! }
//! std::fs::write(&input, data).unwrap();
//!
//! let config = KMeansConfig::new(2)
//!     .with_levels(3)
//!     .with_column_positions(vec![0, 1])
//!     .with_work_dir(dir.path().join("work"));
//!
//! let mut kmeans = HierarchicalKMeans::with_config(config);
//! let report = kmeans.fit(&input, &dir.path().join("tree.csv")).unwrap();
//! assert_eq!(report.levels.len(), 3);
//! ```

mod algorithm;
mod assignment;
mod blob;
mod config;
mod distance;
mod error;
mod fabric;
mod kmeans;
mod merge;
mod path;
mod point;
mod record;
mod store;
mod update;

pub use algorithm::{
    HierarchyController, LevelReport, LevelState, RunReport, StabilizationController,
};
pub use assignment::{AssignmentStage, TaskContext, TaskOutput};
pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::{KMeansConfig, MAX_LEVELS};
pub use distance::{euclidean_distance, nearest_centroid, within_tolerance};
pub use error::KMeansError;
pub use fabric::{Fabric, LocalFabric, RoundOutcome};
pub use kmeans::{HierarchicalKMeans, CENTROID_BLOB};
pub use merge::merge_blocks;
pub use path::{BucketKey, ClusterPath};
pub use point::{is_header, Centroid, Point};
pub use record::{read_record, Record};
pub use store::{CentroidStore, StoreLocation};
pub use update::{PartialSum, UpdateStage};
