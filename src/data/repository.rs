use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;
use crate::models::journal::{JournalRun, RunState};
use crate::models::placement::PlacementRecord;

/// Persists one filing run and its placements. Returns the new run id.
pub fn insert_run(
    conn: &Connection,
    source_folder: &str,
    record: &PlacementRecord,
) -> Result<String, AppError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let created_dirs = serde_json::to_string(&record.created_dirs)?;
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO filing_runs (run_id, source_folder, state, created_dirs, filed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id,
            source_folder,
            RunState::Placed.to_string(),
            created_dirs,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO placements (run_id, filename, destination) VALUES (?1, ?2, ?3)",
        )?;
        for (filename, destination) in &record.placements {
            stmt.execute(params![
                run_id,
                filename,
                destination.to_string_lossy().to_string()
            ])?;
        }
    }

    tx.commit()?;
    Ok(run_id)
}

pub fn mark_run(conn: &Connection, run_id: &str, state: RunState) -> Result<(), AppError> {
    let updated = conn.execute(
        "UPDATE filing_runs SET state = ?1, updated_at = ?2 WHERE run_id = ?3",
        params![state.to_string(), chrono::Utc::now().to_rfc3339(), run_id],
    )?;
    if updated == 0 {
        return Err(AppError::General(format!("unknown filing run: {run_id}")));
    }
    Ok(())
}

/// Most recent run still in `state`, with its placements.
pub fn latest_run_in_state(
    conn: &Connection,
    state: RunState,
) -> Result<Option<JournalRun>, AppError> {
    let row = conn
        .query_row(
            "SELECT run_id, source_folder, state, created_dirs, filed_at
             FROM filing_runs WHERE state = ?1 ORDER BY filed_at DESC, id DESC LIMIT 1",
            params![state.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((run_id, source_folder, state_str, created_dirs, filed_at)) = row else {
        return Ok(None);
    };

    let state = state_str.parse::<RunState>().map_err(AppError::General)?;
    let mut record = PlacementRecord {
        created_dirs: serde_json::from_str(&created_dirs)?,
        ..Default::default()
    };

    let mut stmt = conn.prepare(
        "SELECT filename, destination FROM placements WHERE run_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![run_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (filename, destination) = row?;
        record.insert(&filename, PathBuf::from(destination));
    }

    Ok(Some(JournalRun {
        run_id,
        source_folder,
        state,
        filed_at,
        record,
    }))
}
