//! Line formats shared by the input, the intermediate datasets and the final output.
//!
//! A raw input line is a delimited record. Between hierarchy levels each line
//! is the original record followed by its path so far, every element prefixed
//! by `:` (`48.86,2.35:3:0`). The final output replaces the path tag by the
//! path indexes joined with the field delimiter (`48.86,2.35,3,0,1`).

use crate::config::KMeansConfig;
use crate::error::KMeansError;
use crate::path::{BucketKey, ClusterPath};
use crate::point::{is_header, Point};

/// A record split into its original fields and the path it has been assigned so far
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    fields: &'a str,
    path: ClusterPath,
}

impl<'a> Record<'a> {
    /// Split a line carrying `depth` path elements.
    ///
    /// Path elements are taken from the right, so the original fields may
    /// themselves contain `:`.
    pub fn split(line: &'a str, depth: usize) -> Result<Self, KMeansError> {
        if depth == 0 {
            return Ok(Self {
                fields: line,
                path: ClusterPath::root(),
            });
        }

        let parts: Vec<&str> = line.rsplitn(depth + 1, ':').collect();
        if parts.len() != depth + 1 {
            return Err(KMeansError::parse(
                line,
                format!("expected {} path elements, found {}", depth, parts.len() - 1),
            ));
        }

        let mut indexes = Vec::with_capacity(depth);
        for part in parts[..depth].iter().rev() {
            let index = part.trim().parse::<u16>().map_err(|e| {
                KMeansError::parse(line, format!("bad path element {part:?}: {e}"))
            })?;
            indexes.push(index);
        }

        Ok(Self {
            fields: parts[depth],
            path: ClusterPath::from_indexes(indexes),
        })
    }

    pub fn fields(&self) -> &'a str {
        self.fields
    }

    pub fn path(&self) -> &ClusterPath {
        &self.path
    }

    /// Bucket this record is assigned within
    pub fn bucket(&self) -> BucketKey {
        self.path.as_bucket()
    }

    /// Intermediate line: original fields tagged with the full assigned path
    pub fn tagged(&self, assigned: &ClusterPath) -> String {
        format!("{}:{}", self.fields, assigned)
    }

    /// Final output line: original fields followed by every path index
    pub fn flattened(&self, assigned: &ClusterPath, delimiter: char) -> String {
        format!("{}{}{}", self.fields, delimiter, assigned.join(delimiter))
    }
}

/// Split and parse one line at the given path depth.
///
/// `first_line` is true only for the line at byte offset 0 of the source.
/// Returns `Ok(None)` for blank lines and header lines.
pub fn read_record<'a>(
    line: &'a str,
    depth: usize,
    first_line: bool,
    config: &KMeansConfig,
) -> Result<Option<(Record<'a>, Point)>, KMeansError> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let record = Record::split(line, depth)?;
    if is_header(
        record.fields(),
        &config.column_positions,
        config.delimiter,
        config.header_marker.as_deref(),
        first_line,
    ) {
        return Ok(None);
    }

    let point = Point::parse(record.fields(), &config.column_positions, config.delimiter)?;
    Ok(Some((record, point)))
}
