use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AppConfig;
use crate::data::repository;
use crate::error::AppError;
use crate::models::classification::{build_rows, ClassifiedFile};
use crate::models::journal::RunState;
use crate::models::placement::PlacementRecord;
use crate::services::llm_service::ClassificationClient;
use crate::services::prompt_service::batch_count;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
}

/// Everything one classification session knows, from scan through filing.
#[derive(Debug, Clone, Default)]
pub struct ClassificationSession {
    pub status: SessionStatus,
    pub progress: u8,
    pub current_batch: usize,
    pub total_batches: usize,
    pub message: Option<String>,
    pub files: Vec<String>,
    pub categories: Vec<String>,
    pub batch_size: usize,
    pub classifications: Vec<usize>,
    pub placements: PlacementRecord,
    pub journal_run: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub status: SessionStatus,
    pub progress: u8,
    pub current_batch: usize,
    pub total_batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Inputs the Filer and Cleanup Engine need, copied out of the session.
#[derive(Debug, Clone)]
pub struct FilingInputs {
    pub files: Vec<String>,
    pub classifications: Vec<usize>,
    pub categories: Vec<String>,
}

/// Shared handle to the session. Readers take short locks and never wait on a running batch.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<ClassificationSession>>,
}

impl SessionHandle {
    fn lock(&self) -> MutexGuard<'_, ClassificationSession> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ClassificationSession {
        self.lock().clone()
    }

    pub fn status_view(&self) -> StatusView {
        let session = self.lock();
        StatusView {
            status: session.status,
            progress: session.progress,
            current_batch: session.current_batch,
            total_batches: session.total_batches,
            message: session.message.clone(),
        }
    }

    /// Freezes a new file list for the next run, discarding earlier results.
    pub fn load_scan(
        &self,
        files: Vec<String>,
        categories: Vec<String>,
        batch_size: usize,
    ) -> Result<(), AppError> {
        let mut session = self.lock();
        if session.status == SessionStatus::Processing {
            return Err(AppError::Conflict(
                "classification is already in progress".to_string(),
            ));
        }
        *session = ClassificationSession {
            total_batches: batch_count(files.len(), batch_size),
            files,
            categories,
            batch_size,
            ..Default::default()
        };
        Ok(())
    }

    /// Moves the session to `processing`. A second start while one is running is rejected.
    pub fn begin(&self) -> Result<ClassificationSession, AppError> {
        let mut session = self.lock();
        if session.status == SessionStatus::Processing {
            return Err(AppError::Conflict(
                "classification is already in progress".to_string(),
            ));
        }
        session.status = SessionStatus::Processing;
        session.progress = 0;
        session.current_batch = 0;
        session.message = None;
        session.classifications.clear();
        session.placements = PlacementRecord::default();
        session.journal_run = None;
        Ok(session.clone())
    }

    pub fn batch_started(&self, batch: usize) {
        self.lock().current_batch = batch;
    }

    /// Appends one batch's indices and recomputes progress as files processed over total.
    pub fn batch_finished(&self, indices: &[usize], processed: usize) {
        let mut session = self.lock();
        session.classifications.extend_from_slice(indices);
        let total = session.files.len().max(1);
        session.progress = ((processed * 100) / total).min(100) as u8;
    }

    pub fn complete(&self, classifications: Vec<usize>) {
        let mut session = self.lock();
        session.classifications = classifications;
        session.status = SessionStatus::Completed;
        session.progress = 100;
        session.current_batch = session.total_batches;
    }

    pub fn fail(&self, message: String) {
        let mut session = self.lock();
        session.status = SessionStatus::Error;
        session.message = Some(message);
    }

    /// Result rows for whatever has been classified so far.
    pub fn results(&self) -> Result<(Vec<ClassifiedFile>, Vec<String>, usize), AppError> {
        let session = self.lock();
        if session.classifications.is_empty() {
            return Err(AppError::Conflict(
                "classification has not produced results yet".to_string(),
            ));
        }
        let rows = build_rows(&session.files, &session.classifications, &session.categories);
        Ok((rows, session.categories.clone(), session.files.len()))
    }

    /// Reassigns the file at 1-based scan position `file_id`.
    pub fn adjust(&self, file_id: usize, category_index: usize) -> Result<ClassifiedFile, AppError> {
        let mut session = self.lock();
        if session.status != SessionStatus::Completed {
            return Err(AppError::Conflict(
                "results can only be adjusted after classification completes".to_string(),
            ));
        }
        if file_id == 0 || file_id > session.classifications.len() {
            return Err(AppError::InvalidInput(format!("unknown file id: {file_id}")));
        }
        let Some(category) = session.categories.get(category_index).cloned() else {
            return Err(AppError::InvalidInput(format!(
                "category index out of range: {category_index}"
            )));
        };
        session.classifications[file_id - 1] = category_index;
        Ok(ClassifiedFile {
            id: file_id,
            filename: session.files[file_id - 1].clone(),
            category_index,
            category,
        })
    }

    pub fn filing_inputs(&self) -> Result<FilingInputs, AppError> {
        let session = self.lock();
        if session.status != SessionStatus::Completed {
            return Err(AppError::Conflict(
                "classification has not completed".to_string(),
            ));
        }
        Ok(FilingInputs {
            files: session.files.clone(),
            classifications: session.classifications.clone(),
            categories: session.categories.clone(),
        })
    }

    pub fn store_placements(&self, record: PlacementRecord, journal_run: Option<String>) {
        let mut session = self.lock();
        session.placements = record;
        session.journal_run = journal_run;
    }

    /// Removes and returns the last PlacementRecord, if it holds anything.
    pub fn take_placements(&self) -> Option<(PlacementRecord, Option<String>)> {
        let mut session = self.lock();
        if session.placements.is_empty() {
            return None;
        }
        let record = std::mem::take(&mut session.placements);
        Some((record, session.journal_run.take()))
    }

    pub fn journal_run(&self) -> Option<String> {
        self.lock().journal_run.clone()
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub session: SessionHandle,
    pub client: Arc<dyn ClassificationClient>,
    pub journal: Option<Mutex<Connection>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        client: Arc<dyn ClassificationClient>,
        journal: Option<Connection>,
    ) -> Self {
        Self {
            config,
            session: SessionHandle::default(),
            client,
            journal: journal.map(Mutex::new),
        }
    }

    fn with_journal<T>(
        &self,
        action: &str,
        op: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Option<T> {
        let journal = self.journal.as_ref()?;
        let conn = journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match op(&conn) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, action, "placement journal update failed");
                None
            }
        }
    }

    /// Journals a filing run. Failures are logged and reported as `None`.
    pub fn journal_filing(&self, record: &PlacementRecord) -> Option<String> {
        if record.is_empty() {
            return None;
        }
        let source = self.config.source_folder.to_string_lossy().to_string();
        self.with_journal("record filing", |conn| {
            repository::insert_run(conn, &source, record)
        })
    }

    pub fn journal_mark(&self, run_id: Option<&str>, state: RunState) {
        if let Some(run_id) = run_id {
            self.with_journal("mark run", |conn| repository::mark_run(conn, run_id, state));
        }
    }
}
