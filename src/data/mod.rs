pub mod migrations;
pub mod repository;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::AppError;

const JOURNAL_FILE: &str = "placements.db";

/// Default journal location: the platform data directory, or `./.quark-sort` when none is known.
pub fn default_journal_path() -> PathBuf {
    ProjectDirs::from("", "", "quark-sort")
        .map(|dirs| dirs.data_dir().join(JOURNAL_FILE))
        .unwrap_or_else(|| PathBuf::from(".quark-sort").join(JOURNAL_FILE))
}

pub fn open_journal(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}
