//! Shared broadcast blob holding the centroid store between rounds.

use crate::error::KMeansError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use tracing::debug;

/// One small object readable by every task of a round
///
/// Written once per round by the aggregation task, read by every stage at setup.
pub trait BlobStore: Send + Sync {
    /// Read the whole blob stored at `uri`.
    ///
    /// # Errors
    ///
    /// Returns `KMeansError::StoreCorruption` when nothing was ever written there.
    fn get(&self, uri: &str) -> Result<Vec<u8>, KMeansError>;

    /// Replace the blob stored at `uri`. Readers never see a partial write.
    fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), KMeansError>;
}

/// Blobs kept as files under a root directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, uri: &str) -> PathBuf {
        self.root.join(uri)
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, uri: &str) -> Result<Vec<u8>, KMeansError> {
        let path = self.path_for(uri);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(KMeansError::StoreCorruption(
                format!("blob {} is missing", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), KMeansError> {
        let path = self.path_for(uri);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write aside then rename, so a failed write leaves the previous blob in place.
        let tmp = path.with_extension("partial");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(blob = %path.display(), bytes = bytes.len(), "blob written");
        Ok(())
    }
}

/// Blobs kept in memory, for tests and single-process embedding
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, uri: &str) -> Result<Vec<u8>, KMeansError> {
        self.blobs
            .lock()
            .get(uri)
            .cloned()
            .ok_or_else(|| KMeansError::StoreCorruption(format!("blob {uri} is missing")))
    }

    fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), KMeansError> {
        self.blobs.lock().insert(uri.to_string(), bytes.to_vec());
        Ok(())
    }
}
