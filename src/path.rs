use crate::error::KMeansError;
use std::fmt;

/// Ordered position indexes from the root of the hierarchy down to a centroid.
///
/// A centroid at level `L` carries a path of length `L`; its last element is
/// the centroid's position among the siblings of its bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterPath(Vec<u16>);

impl ClusterPath {
    /// The empty path, carried by level-1 records before assignment
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_indexes(indexes: Vec<u16>) -> Self {
        Self(indexes)
    }

    pub fn indexes(&self) -> &[u16] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn last_index(&self) -> Option<u16> {
        self.0.last().copied()
    }

    /// Path extended by one position index
    pub fn child(&self, index: u16) -> Self {
        let mut indexes = Vec::with_capacity(self.0.len() + 1);
        indexes.extend_from_slice(&self.0);
        indexes.push(index);
        Self(indexes)
    }

    /// Key of the bucket holding this centroid (the path without its last element)
    pub fn parent(&self) -> BucketKey {
        match self.0.split_last() {
            Some((_, prefix)) => BucketKey(prefix.to_vec()),
            None => BucketKey::root(),
        }
    }

    /// Key of the bucket whose centroids are this path's children
    pub fn as_bucket(&self) -> BucketKey {
        BucketKey(self.0.clone())
    }

    /// Parse a colon-joined tag such as `"2:0:1"`
    pub fn parse_tag(tag: &str) -> Result<Self, KMeansError> {
        if tag.is_empty() {
            return Ok(Self::root());
        }
        tag.split(':')
            .map(|s| {
                s.trim()
                    .parse::<u16>()
                    .map_err(|e| KMeansError::parse(tag, format!("bad path element {s:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Render the indexes joined by `separator`
    pub fn join(&self, separator: char) -> String {
        let mut out = String::with_capacity(self.0.len() * 3);
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_str(&index.to_string());
        }
        out
    }
}

impl fmt::Display for ClusterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(':'))
    }
}

/// Parent path shared by all centroids of one bucket.
///
/// Kept as a typed list internally. The text form is only produced for
/// logging and serialization: `"0"` for the root, the colon-joined prefix
/// otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(Vec<u16>);

impl BucketKey {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of the centroid at `index` inside this bucket
    pub fn child(&self, index: u16) -> ClusterPath {
        ClusterPath(self.0.clone()).child(index)
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("0")
        } else {
            f.write_str(&ClusterPath(self.0.clone()).join(':'))
        }
    }
}
