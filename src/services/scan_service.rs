use std::fs;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::AppError;

/// Names of the regular files directly inside `source_dir`, sorted.
///
/// `extensions` filters by extension (case-insensitive, leading dot optional);
/// an empty slice keeps every file. A missing source directory is created and
/// scans as empty. Names that are not valid UTF-8 are skipped.
pub fn scan_files(source_dir: &Path, extensions: &[String]) -> Result<Vec<String>, AppError> {
    if !source_dir.exists() {
        warn!(dir = %source_dir.display(), "source folder does not exist, creating it");
        fs::create_dir_all(source_dir)?;
        return Ok(Vec::new());
    }
    if !source_dir.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "source folder is not a directory: {}",
            source_dir.display()
        )));
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(source_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| AppError::General(format!("scan failed: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "file name is not valid UTF-8, skipping");
            continue;
        };
        if !wanted.is_empty() {
            let ext = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !wanted.contains(&ext) {
                continue;
            }
        }
        files.push(name);
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_files_sorted_without_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("a.PDF"), "a").unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/inner.txt"), "x").unwrap();

        let files = scan_files(tmp.path(), &[]).unwrap();
        assert_eq!(files, vec!["a.PDF".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.PDF"), "a").unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("noext"), "c").unwrap();

        let files = scan_files(tmp.path(), &[".pdf".to_string()]).unwrap();
        assert_eq!(files, vec!["a.PDF".to_string()]);
    }

    #[test]
    fn missing_folder_is_created_and_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("incoming");
        assert!(scan_files(&dir, &[]).unwrap().is_empty());
        assert!(dir.is_dir());
    }

    #[test]
    fn file_path_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("x.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(scan_files(&file, &[]), Err(AppError::InvalidInput(_))));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("good.txt"), b"x").unwrap();
        let bad = tmp.path().join(OsStr::from_bytes(b"bad\xff.txt"));
        if fs::write(&bad, b"x").is_err() {
            // Filesystems that enforce UTF-8 names cannot hold the file at all.
            return;
        }

        let files = scan_files(tmp.path(), &[]).unwrap();

        assert_eq!(files, vec!["good.txt".to_string()]);
        assert!(bad.exists());
    }
}
