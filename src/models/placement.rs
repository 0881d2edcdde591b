use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where each file was copied during one filing run. Rollback and cleanup both work from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub placements: BTreeMap<String, PathBuf>,
    /// Directories that did not exist before filing, in creation order.
    pub created_dirs: Vec<PathBuf>,
}

impl PlacementRecord {
    pub fn insert(&mut self, filename: &str, destination: PathBuf) {
        self.placements.insert(filename.to_string(), destination);
    }

    pub fn note_created_dir(&mut self, dir: &Path) {
        if !self.created_dirs.iter().any(|d| d == dir) {
            self.created_dirs.push(dir.to_path_buf());
        }
    }

    pub fn destination(&self, filename: &str) -> Option<&Path> {
        self.placements.get(filename).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilingReport {
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_files: Vec<String>,
    pub category_stats: BTreeMap<String, usize>,
    pub placements: PlacementRecord,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    pub deleted_count: usize,
    pub failed_to_delete_count: usize,
    pub skipped_count: usize,
    pub failed_files: Vec<String>,
    pub removed_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub failed_files: Vec<FailedFile>,
}
