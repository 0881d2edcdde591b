use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS filing_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT UNIQUE NOT NULL,
    source_folder TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'placed',
    created_dirs TEXT NOT NULL DEFAULT '[]',
    filed_at TEXT NOT NULL,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_state ON filing_runs(state, filed_at DESC);

CREATE TABLE IF NOT EXISTS placements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES filing_runs(run_id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    destination TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_placements_run ON placements(run_id);
";

pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(SCHEMA_V1)?;
    Ok(())
}
