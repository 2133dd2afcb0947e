use crate::blob::BlobStore;
use crate::config::KMeansConfig;
use crate::error::KMeansError;
use crate::path::{BucketKey, ClusterPath};
use crate::point::{Centroid, Point};
use crate::record::read_record;
use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;
use tracing::debug;

/// Where a run keeps its centroid store between rounds
#[derive(Clone)]
pub struct StoreLocation {
    blob: Arc<dyn BlobStore>,
    uri: String,
}

impl StoreLocation {
    pub fn new(blob: Arc<dyn BlobStore>, uri: impl Into<String>) -> Self {
        Self {
            blob,
            uri: uri.into(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn blob(&self) -> &dyn BlobStore {
        self.blob.as_ref()
    }
}

impl fmt::Debug for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreLocation").field("uri", &self.uri).finish()
    }
}

/// Centroids of one hierarchy level, grouped by bucket.
///
/// Every bucket holds at most `k` centroids sharing the bucket's parent path,
/// with position indexes `0..len` in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidStore {
    level: usize,
    buckets: BTreeMap<BucketKey, Vec<Centroid>>,
}

impl CentroidStore {
    /// Create an empty store for `level` (1-based)
    pub fn new(level: usize) -> Self {
        Self {
            level,
            buckets: BTreeMap::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Total number of centroids across all buckets
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, key: &BucketKey) -> Option<&[Centroid]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&BucketKey, &[Centroid])> {
        self.buckets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// All centroids, bucket by bucket in key order
    pub fn iter(&self) -> impl Iterator<Item = &Centroid> {
        self.buckets.values().flatten()
    }

    pub fn get(&self, path: &ClusterPath) -> Option<&Centroid> {
        let index = path.last_index()? as usize;
        self.buckets.get(&path.parent())?.get(index)
    }

    /// Append a centroid to `key`'s bucket at the next free position.
    pub fn push(&mut self, key: BucketKey, point: Point) -> Result<ClusterPath, KMeansError> {
        if key.depth() + 1 != self.level {
            return Err(KMeansError::StoreCorruption(format!(
                "bucket {} does not belong to level {}",
                key, self.level
            )));
        }
        let bucket = self.buckets.entry(key.clone()).or_default();
        let index = u16::try_from(bucket.len()).map_err(|_| {
            KMeansError::StoreCorruption(format!("bucket {key} is full"))
        })?;
        let path = key.child(index);
        bucket.push(Centroid::new(point, path.clone()));
        Ok(path)
    }

    /// Overwrite the slot at `centroid.path()`.
    ///
    /// # Errors
    ///
    /// Returns `KMeansError::StoreCorruption` if no such slot exists.
    pub fn replace(&mut self, centroid: Centroid) -> Result<(), KMeansError> {
        let path = centroid.path();
        let slot = path
            .last_index()
            .and_then(|index| {
                self.buckets
                    .get_mut(&path.parent())
                    .and_then(|b| b.get_mut(index as usize))
            })
            .ok_or_else(|| KMeansError::StoreCorruption(format!("no centroid at path {path}")))?;
        *slot = centroid;
        Ok(())
    }

    /// Seed the store for `level` from a record source.
    ///
    /// Header and blank lines are skipped. Each bucket greedily takes the first
    /// `k` points that are not exact duplicates of a point it already holds.
    /// Reading stops once `expected_buckets` buckets are full, or at the end of
    /// the source; a bucket may then hold fewer than `k` centroids. A parent
    /// that received no records opens no bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if a record is malformed, or if the source yields no point.
    pub fn initiate_from<R: BufRead>(
        source: R,
        config: &KMeansConfig,
        level: usize,
        expected_buckets: usize,
    ) -> Result<Self, KMeansError> {
        let k = config.k;
        let depth = level.saturating_sub(1);
        let mut store = Self::new(level);
        let mut full_buckets = 0;

        for (i, line) in source.lines().enumerate() {
            let line = line?;
            let Some((record, point)) = read_record(&line, depth, i == 0, config)? else {
                continue;
            };

            let key = record.bucket();
            let bucket = store.buckets.entry(key.clone()).or_default();
            if bucket.len() >= k || bucket.iter().any(|c| c.point().same_coords(&point)) {
                continue;
            }

            let path = key.child(bucket.len() as u16);
            bucket.push(Centroid::new(point, path));

            if bucket.len() == k {
                full_buckets += 1;
                if full_buckets == expected_buckets {
                    break;
                }
            }
        }

        if store.is_empty() {
            return Err(KMeansError::InsufficientData(format!(
                "no seed point found for level {level}"
            )));
        }

        debug!(
            level,
            centroids = store.len(),
            buckets = store.bucket_count(),
            full_buckets,
            "centroid store seeded"
        );
        Ok(store)
    }

    /// One-line text form: each centroid is its coordinates followed by its
    /// path elements, joined by `:`; centroids are separated by `,`.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for centroid in self.iter() {
            if !out.is_empty() {
                out.push(',');
            }
            for coord in centroid.point().coords() {
                out.push_str(&coord.to_string());
                out.push(':');
            }
            out.push_str(&centroid.path().to_string());
        }
        out
    }

    /// Inverse of [`CentroidStore::serialize`].
    ///
    /// # Errors
    ///
    /// Returns `KMeansError::StoreCorruption` if any centroid does not have
    /// `dims` coordinates and `level` path elements, if positions are out of
    /// order, or if the total is not `expected`.
    pub fn deserialize(
        text: &str,
        dims: usize,
        level: usize,
        expected: usize,
    ) -> Result<Self, KMeansError> {
        let text = text.trim_end_matches(|c| c == '\n' || c == '\r');
        let mut store = Self::new(level);

        if !text.is_empty() {
            for (i, entry) in text.split(',').enumerate() {
                let fields: Vec<&str> = entry.split(':').collect();
                if fields.len() != dims + level {
                    return Err(KMeansError::StoreCorruption(format!(
                        "centroid {} has {} fields, expected {}",
                        i,
                        fields.len(),
                        dims + level
                    )));
                }

                let coords = fields[..dims]
                    .iter()
                    .map(|f| f.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        KMeansError::StoreCorruption(format!("centroid {i} coordinate: {e}"))
                    })?;
                let indexes = fields[dims..]
                    .iter()
                    .map(|f| f.parse::<u16>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| KMeansError::StoreCorruption(format!("centroid {i} path: {e}")))?;

                let path = ClusterPath::from_indexes(indexes);
                let bucket = store.buckets.entry(path.parent()).or_default();
                if path.last_index() != Some(bucket.len() as u16) {
                    return Err(KMeansError::StoreCorruption(format!(
                        "centroid {i} at path {path} is out of position order"
                    )));
                }
                bucket.push(Centroid::new(Point::new(coords), path));
            }
        }

        if store.len() != expected {
            return Err(KMeansError::StoreCorruption(format!(
                "expected {} centroids at level {}, found {}",
                expected,
                level,
                store.len()
            )));
        }
        Ok(store)
    }

    /// Overwrite the shared blob with this store
    pub fn persist(&self, location: &StoreLocation) -> Result<(), KMeansError> {
        location
            .blob()
            .put(location.uri(), self.serialize().as_bytes())
    }

    /// Read the store back from the shared blob
    pub fn load(
        location: &StoreLocation,
        dims: usize,
        level: usize,
        expected: usize,
    ) -> Result<Self, KMeansError> {
        let bytes = location.blob().get(location.uri())?;
        let text = String::from_utf8(bytes)
            .map_err(|e| KMeansError::StoreCorruption(format!("blob is not UTF-8: {e}")))?;
        Self::deserialize(&text, dims, level, expected)
    }
}
