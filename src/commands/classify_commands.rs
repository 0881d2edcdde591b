use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::commands::classify_pipeline::{run_classification, BatchEvent, ClassificationPlan};
use crate::error::AppError;
use crate::models::journal::RunState;
use crate::services::filing_service::file_classified;
use crate::services::prompt_service::batch_count;
use crate::services::scan_service::scan_files;
use crate::services::undo_service::{cleanup_sources, rollback};
use crate::state::{AppState, StatusView};

pub type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub file_id: usize,
    pub category_index: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

async fn blocking<T, F>(op: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| AppError::General(format!("background task failed: {e}")))?
}

pub async fn scan(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    let source = state.config.source_folder.clone();
    let extensions = state.config.extensions();
    let files = blocking(move || scan_files(&source, &extensions)).await?;

    let categories = state.config.categories.clone();
    let batch_size = state.config.settings.batch_size;
    state
        .session
        .load_scan(files.clone(), categories.clone(), batch_size)?;
    info!(count = files.len(), "source folder scanned");

    Ok(Json(json!({
        "success": true,
        "count": files.len(),
        "batches": batch_count(files.len(), batch_size),
        "files": files,
        "categories": categories,
    })))
}

pub async fn start(
    State(state): State<SharedState>,
) -> Result<Json<MessageResponse>, AppError> {
    if state.session.snapshot().files.is_empty() {
        return Err(AppError::InvalidInput(
            "no files to classify, scan the source folder first".to_string(),
        ));
    }
    let session = state.session.begin()?;
    let plan = ClassificationPlan::new(&state.config, session.files, session.categories);
    let total_batches = batch_count(plan.files.len(), plan.batch_size);

    let worker_state = state.clone();
    let worker = tokio::spawn(async move {
        let handle = worker_state.session.clone();
        run_classification(worker_state.client.as_ref(), &plan, move |event| match event {
            BatchEvent::Started { batch, .. } => handle.batch_started(batch),
            BatchEvent::Finished {
                processed, indices, ..
            } => handle.batch_finished(indices, processed),
        })
        .await
    });

    let session = state.session.clone();
    tokio::spawn(async move {
        match worker.await {
            Ok(classifications) => {
                info!(files = classifications.len(), "classification completed");
                session.complete(classifications);
            }
            Err(err) => {
                error!(error = %err, "classification task aborted");
                session.fail(format!("classification task aborted: {err}"));
            }
        }
    });

    Ok(MessageResponse::ok(format!(
        "classification started, {total_batches} batches"
    )))
}

pub async fn status(State(state): State<SharedState>) -> Json<StatusView> {
    Json(state.session.status_view())
}

pub async fn results(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    let (rows, categories, total_files) = state.session.results()?;
    Ok(Json(json!({
        "success": true,
        "results": rows,
        "categories": categories,
        "total_files": total_files,
    })))
}

pub async fn adjust(
    State(state): State<SharedState>,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<Value>, AppError> {
    let row = state
        .session
        .adjust(request.file_id, request.category_index)?;
    info!(file = %row.filename, category = %row.category, "classification adjusted");
    Ok(Json(json!({ "success": true, "result": row })))
}

pub async fn execute(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    let inputs = state.session.filing_inputs()?;
    let worker_state = state.clone();
    let (report, run_id) = blocking(move || {
        let config = &worker_state.config;
        let report = file_classified(
            &inputs.files,
            &inputs.classifications,
            &inputs.categories,
            &config.source_folder,
            &config.resolver(),
        );
        let run_id = worker_state.journal_filing(&report.placements);
        Ok((report, run_id))
    })
    .await?;

    state
        .session
        .store_placements(report.placements.clone(), run_id);

    Ok(Json(json!({
        "success": true,
        "stats": {
            "success": report.success_count,
            "failed": report.failed_count,
            "failed_files": report.failed_files,
            "category_stats": report.category_stats,
        },
    })))
}

pub async fn cleanup(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    let inputs = state.session.filing_inputs()?;
    if !state.config.source_folder.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "source folder does not exist: {}",
            state.config.source_folder.display()
        )));
    }
    let run_id = state.session.journal_run();

    let worker_state = state.clone();
    let report = blocking(move || {
        let config = &worker_state.config;
        let report = cleanup_sources(
            &inputs.files,
            &inputs.classifications,
            &inputs.categories,
            &config.source_folder,
            &config.resolver(),
        );
        worker_state.journal_mark(run_id.as_deref(), RunState::Cleaned);
        Ok(report)
    })
    .await?;

    Ok(Json(json!({
        "success": true,
        "deleted_count": report.deleted_count,
        "failed_count": report.failed_count,
        "skipped_count": report.skipped_count,
        "failed_files": report.failed_files,
    })))
}

pub async fn rollback_last(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    let Some((record, run_id)) = state.session.take_placements() else {
        return Err(AppError::Conflict("nothing to roll back".to_string()));
    };

    let worker_state = state.clone();
    let report = blocking(move || {
        let report = rollback(&record, &worker_state.config.source_folder);
        worker_state.journal_mark(run_id.as_deref(), RunState::RolledBack);
        Ok(report)
    })
    .await?;

    Ok(Json(json!({
        "success": true,
        "deleted_count": report.deleted_count,
        "failed_to_delete_count": report.failed_to_delete_count,
        "skipped_count": report.skipped_count,
        "failed_files": report.failed_files,
    })))
}

pub async fn get_config(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "success": true, "config": state.config.masked() }))
}

pub async fn check(State(state): State<SharedState>) -> Json<MessageResponse> {
    match state.client.check().await {
        Ok(()) => MessageResponse::ok("classification endpoint reachable"),
        Err(err) => {
            warn!(error = %err, "connectivity check failed");
            Json(MessageResponse {
                success: false,
                message: err.to_string(),
            })
        }
    }
}
