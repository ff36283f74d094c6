//! Index compaction.
//!
//! Compaction folds the current logical index into one new manifest, then
//! deletes every index file the manifest supersedes. It is not safe to run
//! two compactions of one location at the same time.
//!
//! Inserts may run concurrently. The manifest takes a timestamp chosen before
//! discovery, so incrementals stamped after it stay visible next to it. An
//! incremental stamped before it but landing after discovery is copied into a
//! fresh incremental before the original is removed.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};
use tscribe_common::id::{FileKind, FileStamp};
use tscribe_config::StoreConfig;

use crate::error::Result;
use crate::index::{self, discover, find_orphaned_data_files, list_index_files, load, IndexFile};
use crate::io::FileIo;

/// What one compaction did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Rows in the new manifest.
    pub rows: usize,
    /// File name of the new manifest, if one was written.
    pub manifest: Option<String>,
    pub index_files_deleted: usize,
    /// Incrementals that landed during compaction and were copied forward.
    pub index_files_rescued: usize,
    /// Orphaned data files that were deleted.
    pub orphans_deleted: Vec<String>,
}

/// Compact the index of the location behind `io`.
///
/// With `delete_orphans`, data files the new manifest does not reference are
/// removed after the manifest is written.
pub fn compact(io: &FileIo, config: &StoreConfig, delete_orphans: bool) -> Result<CompactionReport> {
    let cutoff = io.new_stamp(FileKind::Manifest);
    let discovered = discover(io)?;
    compact_snapshot(io, config, delete_orphans, cutoff, discovered)
}

/// Compact `discovered` into a manifest named by `cutoff`.
fn compact_snapshot(
    io: &FileIo,
    config: &StoreConfig,
    delete_orphans: bool,
    cutoff: FileStamp,
    discovered: Vec<IndexFile>,
) -> Result<CompactionReport> {
    if discovered.is_empty() {
        info!(location = %io.root().display(), "Nothing to compact");
        let mut report = CompactionReport::default();
        if delete_orphans {
            report.orphans_deleted = remove_orphans(io, &HashSet::new())?;
        }
        return Ok(report);
    }

    let floor = discovered
        .iter()
        .find(|f| f.stamp.kind == FileKind::Manifest)
        .map(|f| f.stamp.timestamp.clone());
    let table = load(io, &discovered)?;
    let merged = table.concat()?;
    let manifest = index::append_as(io, &merged, cutoff, config)?;

    let mut late: Vec<IndexFile> = Vec::new();
    let mut superseded: Vec<IndexFile> = Vec::new();
    for file in list_index_files(io)? {
        if file.path == manifest.path {
            continue;
        }
        if discovered.iter().any(|d| d.path == file.path) {
            superseded.push(file);
            continue;
        }
        let ts = &file.stamp.timestamp;
        if *ts > manifest.stamp.timestamp {
            continue;
        }
        let after_floor = floor.as_ref().map_or(true, |floor| ts > floor);
        if file.stamp.kind == FileKind::Incremental && after_floor {
            late.push(file.clone());
        }
        superseded.push(file);
    }

    let mut rescued = 0;
    if !late.is_empty() {
        let carried = load(io, &late)?.concat()?;
        if carried.num_rows() > 0 {
            let copy = index::append(io, &carried, FileKind::Incremental, config)?;
            warn!(
                files = late.len(),
                rows = carried.num_rows(),
                copy = %copy.path.display(),
                "Carried forward index files written during compaction"
            );
        }
        rescued = late.len();
    }

    let mut deleted = 0;
    for file in superseded {
        if io.remove(&file.path)? {
            deleted += 1;
        }
    }

    let orphans_deleted = if delete_orphans {
        remove_orphans(io, &table.referenced_filenames())?
    } else {
        Vec::new()
    };

    let report = CompactionReport {
        rows: merged.num_rows(),
        manifest: Some(manifest.stamp.file_name()),
        index_files_deleted: deleted,
        index_files_rescued: rescued,
        orphans_deleted,
    };
    info!(
        location = %io.root().display(),
        rows = report.rows,
        index_files_deleted = report.index_files_deleted,
        orphans_deleted = report.orphans_deleted.len(),
        "Compacted index"
    );
    Ok(report)
}

fn remove_orphans(io: &FileIo, referenced: &HashSet<String>) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for path in find_orphaned_data_files(io, referenced)? {
        let name = file_name(&path);
        if io.remove(&path)? {
            warn!(path = %path.display(), "Deleted orphaned data file");
            removed.push(name);
        }
    }
    Ok(removed)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
