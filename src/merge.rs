//! Concatenation of per-task block files into a round's output.

use crate::error::KMeansError;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Concatenate `blocks` into `output`, then delete them.
///
/// Blocks are concatenated in file-name order. The output is assembled next
/// to its final location and renamed into place, so a failure never leaves a
/// partial or duplicated output behind.
///
/// # Errors
///
/// Returns `KMeansError::MergeFailure` if a block cannot be read or deleted,
/// or the output cannot be written.
pub fn merge_blocks(blocks: &[PathBuf], output: &Path) -> Result<(), KMeansError> {
    let mut ordered: Vec<&PathBuf> = blocks.iter().collect();
    ordered.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| failure("create output directory", parent, e))?;
    }

    let staging = staging_path(output);
    let result = concat_into(&ordered, &staging);
    if let Err(e) = result {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    fs::rename(&staging, output).map_err(|e| failure("move merged output", output, e))?;

    for block in &ordered {
        fs::remove_file(block).map_err(|e| failure("delete block", block, e))?;
    }

    debug!(
        blocks = ordered.len(),
        output = %output.display(),
        "block files merged"
    );
    Ok(())
}

fn concat_into(blocks: &[&PathBuf], staging: &Path) -> Result<(), KMeansError> {
    let file = File::create(staging).map_err(|e| failure("create", staging, e))?;
    let mut writer = BufWriter::new(file);

    for block in blocks {
        let mut reader = File::open(block).map_err(|e| failure("open block", block, e))?;
        io::copy(&mut reader, &mut writer).map_err(|e| failure("copy block", block, e))?;
    }

    writer.flush().map_err(|e| failure("flush", staging, e))?;
    Ok(())
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".merging");
    output.with_file_name(name)
}

fn failure(action: &str, path: &Path, err: io::Error) -> KMeansError {
    KMeansError::MergeFailure(format!("{} {}: {}", action, path.display(), err))
}
