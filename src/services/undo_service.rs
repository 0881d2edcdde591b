use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::models::placement::{CleanupReport, FailedFile, PlacementRecord, RollbackReport};
use crate::services::filing_service::{same_file, CategoryPathResolver};

/// Deletes the copies listed in `record`, then prunes directories the copies leave empty.
///
/// Missing copies are skipped rather than failed, and so is any destination that
/// is the file's own source in `source_dir`. Parent directories of the copies
/// are removed when empty, followed by any directories the filing run created,
/// deepest first. Directories that still hold other files are left alone.
pub fn rollback(record: &PlacementRecord, source_dir: &Path) -> RollbackReport {
    let mut report = RollbackReport::default();

    for (filename, destination) in &record.placements {
        if !destination.exists() {
            info!(file = %filename, destination = %destination.display(), "nothing to roll back");
            report.skipped_count += 1;
            continue;
        }
        if same_file(&source_dir.join(filename), destination) {
            warn!(
                file = %filename,
                destination = %destination.display(),
                "recorded copy is the source itself, keeping it"
            );
            report.skipped_count += 1;
            continue;
        }
        match fs::remove_file(destination) {
            Ok(()) => {
                report.deleted_count += 1;
                info!(destination = %destination.display(), "removed filed copy");
            }
            Err(err) => {
                warn!(destination = %destination.display(), error = %err, "could not remove filed copy");
                report.failed_to_delete_count += 1;
                report.failed_files.push(filename.clone());
            }
        }
    }

    let parents: BTreeSet<PathBuf> = record
        .placements
        .values()
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect();

    for dir in parents.iter().chain(record.created_dirs.iter().rev()) {
        if report.removed_dirs.contains(dir) {
            continue;
        }
        match remove_if_empty(dir) {
            Ok(true) => {
                info!(dir = %dir.display(), "removed empty directory");
                report.removed_dirs.push(dir.clone());
            }
            Ok(false) => {}
            Err(err) => warn!(dir = %dir.display(), error = %err, "could not remove directory"),
        }
    }

    report
}

fn remove_if_empty(dir: &Path) -> io::Result<bool> {
    if !dir.is_dir() || fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir)?;
    Ok(true)
}

/// Deletes source files whose filed copy is present at the resolved destination.
///
/// Files with no valid classification, or whose copy cannot be found, keep their
/// source. Deletion failures are collected and do not stop the run.
pub fn cleanup_sources(
    files: &[String],
    classifications: &[usize],
    categories: &[String],
    source_dir: &Path,
    resolver: &CategoryPathResolver,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for (filename, &category_idx) in files.iter().zip(classifications) {
        let Some(category) = categories.get(category_idx) else {
            continue;
        };
        let destination = resolver.destination_for(category, filename);
        let source = source_dir.join(filename);

        if !destination.is_file() {
            warn!(file = %filename, destination = %destination.display(), "filed copy missing, keeping source");
            report.skipped_count += 1;
            continue;
        }
        if !source.exists() {
            report.skipped_count += 1;
            continue;
        }
        if same_file(&source, &destination) {
            warn!(file = %filename, "destination is the source itself, keeping it");
            report.skipped_count += 1;
            continue;
        }

        match fs::remove_file(&source) {
            Ok(()) => {
                report.deleted_count += 1;
                info!(file = %filename, "removed source file");
            }
            Err(err) => {
                warn!(file = %filename, error = %err, "could not remove source file");
                report.failed_count += 1;
                report.failed_files.push(FailedFile {
                    file: filename.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    report
}
