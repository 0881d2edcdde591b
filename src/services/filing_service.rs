use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::models::placement::{FilingReport, PlacementRecord};

/// Maps a category label to the directory its files are copied into.
#[derive(Debug, Clone)]
pub struct CategoryPathResolver {
    target_base: PathBuf,
    overrides: BTreeMap<String, String>,
    relative_root: Option<PathBuf>,
}

impl CategoryPathResolver {
    pub fn new(target_base: &Path, overrides: BTreeMap<String, String>) -> Self {
        Self {
            target_base: target_base.to_path_buf(),
            overrides,
            relative_root: None,
        }
    }

    /// Resolves relative overrides against `root` instead of the process working directory.
    pub fn with_relative_root(mut self, root: &Path) -> Self {
        self.relative_root = Some(root.to_path_buf());
        self
    }

    pub fn has_override(&self, label: &str) -> bool {
        self.overrides.contains_key(label)
    }

    pub fn directory_for(&self, label: &str) -> PathBuf {
        match self.overrides.get(label) {
            Some(path) => self.absolutize(Path::new(path)),
            None => self.target_base.join(label),
        }
    }

    pub fn destination_for(&self, label: &str, filename: &str) -> PathBuf {
        self.directory_for(label).join(filename)
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return normalize_lexically(path);
        }
        let root = match &self.relative_root {
            Some(root) => root.clone(),
            None => match std::env::current_dir() {
                Ok(cwd) => cwd,
                Err(_) => return path.to_path_buf(),
            },
        };
        normalize_lexically(&root.join(path))
    }
}

/// Removes `.` components and folds `..` into its parent without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Copies every classified file from `source_dir` into its category directory.
///
/// `classifications[i]` belongs to `files[i]`. Files with no classification, an
/// index outside `categories`, or no readable source are counted as failed. The
/// source directory is never modified, and re-running overwrites the same copies.
pub fn file_classified(
    files: &[String],
    classifications: &[usize],
    categories: &[String],
    source_dir: &Path,
    resolver: &CategoryPathResolver,
) -> FilingReport {
    let mut report = FilingReport {
        category_stats: categories.iter().map(|c| (c.clone(), 0)).collect(),
        ..Default::default()
    };

    for (i, filename) in files.iter().enumerate() {
        let Some(&category_idx) = classifications.get(i) else {
            warn!(file = %filename, "no classification for file, skipping");
            record_failure(&mut report, filename);
            continue;
        };
        let Some(category) = categories.get(category_idx) else {
            warn!(file = %filename, index = category_idx, "classification index out of range, skipping");
            record_failure(&mut report, filename);
            continue;
        };

        let source = source_dir.join(filename);
        if !source.is_file() {
            warn!(file = %filename, "source file does not exist");
            record_failure(&mut report, filename);
            continue;
        }

        let dir = resolver.directory_for(category);
        if let Err(err) = ensure_dir(&dir, &mut report.placements) {
            warn!(file = %filename, dir = %dir.display(), error = %err, "could not create category directory");
            record_failure(&mut report, filename);
            continue;
        }

        let destination = dir.join(filename);
        if same_file(&source, &destination) {
            warn!(
                file = %filename,
                dir = %dir.display(),
                "category directory is the source folder, skipping"
            );
            record_failure(&mut report, filename);
            continue;
        }
        match copy_preserving(&source, &destination) {
            Ok(()) => {
                *report.category_stats.entry(category.clone()).or_default() += 1;
                report.success_count += 1;
                report.placements.insert(filename, destination);
                info!(file = %filename, category = %category, dir = %dir.display(), "filed");
            }
            Err(err) => {
                warn!(file = %filename, error = %err, "copy failed");
                record_failure(&mut report, filename);
            }
        }
    }

    report
}

fn record_failure(report: &mut FilingReport, filename: &str) {
    report.failed_count += 1;
    report.failed_files.push(filename.to_string());
}

fn ensure_dir(dir: &Path, record: &mut PlacementRecord) -> io::Result<()> {
    let missing: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect();
    fs::create_dir_all(dir)?;
    for created in missing.iter().rev() {
        record.note_created_dir(created);
    }
    Ok(())
}

/// True when both paths exist and resolve to the same file.
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copies through a hidden temporary sibling so `destination` only ever holds a complete copy.
fn copy_preserving(source: &Path, destination: &Path) -> io::Result<()> {
    let (Some(dir), Some(name)) = (destination.parent(), destination.file_name()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid destination: {}", destination.display()),
        ));
    };
    let staging = dir.join(format!(
        ".{}.{}.part",
        name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));

    let result = (|| -> io::Result<()> {
        fs::copy(source, &staging)?;
        let modified = fs::metadata(source)?.modified()?;
        fs::File::options()
            .write(true)
            .open(&staging)?
            .set_modified(modified)?;
        fs::rename(&staging, destination)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}
