use std::io::{BufRead, Write};

use tracing::info;

use crate::commands::classify_pipeline::{run_classification, BatchEvent, ClassificationPlan};
use crate::error::AppError;
use crate::models::journal::RunState;
use crate::models::placement::{CleanupReport, FilingReport, RollbackReport};
use crate::services::filing_service::{file_classified, CategoryPathResolver};
use crate::services::scan_service::scan_files;
use crate::services::undo_service::{cleanup_sources, rollback};
use crate::state::AppState;

const RULE: &str = "============================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept,
    Reject,
    View,
}

/// Where the operator's answers come from. Blocks until an answer is available.
pub trait DecisionSource {
    fn confirm_classification(&mut self) -> Result<ReviewDecision, AppError>;
    fn confirm_cleanup(&mut self) -> Result<bool, AppError>;
}

pub fn parse_review_answer(answer: &str) -> Option<ReviewDecision> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "是" => Some(ReviewDecision::Accept),
        "n" | "no" | "否" => Some(ReviewDecision::Reject),
        "v" | "view" => Some(ReviewDecision::View),
        _ => None,
    }
}

pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match parse_review_answer(answer)? {
        ReviewDecision::Accept => Some(true),
        ReviewDecision::Reject => Some(false),
        ReviewDecision::View => None,
    }
}

/// Prompts on a writer and reads answers line by line, re-prompting on anything unrecognised.
/// End of input counts as "no".
pub struct PromptDecisions<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptDecisions<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask<T>(
        &mut self,
        question: &str,
        hint: &str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<Option<T>, AppError> {
        loop {
            write!(self.output, "\n{question} ")?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            match parse(&line) {
                Some(answer) => return Ok(Some(answer)),
                None => writeln!(self.output, "{hint}")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> DecisionSource for PromptDecisions<R, W> {
    fn confirm_classification(&mut self) -> Result<ReviewDecision, AppError> {
        writeln!(self.output, "\nReview the classification:")?;
        writeln!(self.output, "  y - accept and continue")?;
        writeln!(self.output, "  n - reject and undo the filing")?;
        writeln!(self.output, "  v - show where every file went")?;
        let answer = self.ask(
            "Your choice (y/n/v):",
            "Please answer y, n or v",
            parse_review_answer,
        )?;
        Ok(answer.unwrap_or(ReviewDecision::Reject))
    }

    fn confirm_cleanup(&mut self) -> Result<bool, AppError> {
        let answer = self.ask(
            "Delete the filed files from the source folder? (y/n):",
            "Please answer y or n",
            parse_yes_no,
        )?;
        Ok(answer.unwrap_or(false))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    AwaitingConfirm,
    AwaitingCleanupConfirm,
    RolledBack,
    Finished,
}

#[derive(Debug, Default)]
pub struct WorkflowOutcome {
    pub files: Vec<String>,
    pub classifications: Vec<usize>,
    pub filing: FilingReport,
    pub rollback: Option<RollbackReport>,
    pub cleanup: Option<CleanupReport>,
    pub remaining: Vec<String>,
}

/// Runs scan, classification, filing and the two confirmation pauses end to end.
pub async fn run_offline<D, W>(
    state: &AppState,
    decisions: &mut D,
    out: &mut W,
) -> Result<WorkflowOutcome, AppError>
where
    D: DecisionSource,
    W: Write,
{
    let config = &state.config;
    let resolver = config.resolver();
    let mut outcome = WorkflowOutcome::default();

    writeln!(out, "{RULE}\nFilename-based file classifier\n{RULE}")?;
    writeln!(out, "\n[1/4] Configuration loaded")?;
    if !config.category_paths.is_empty() {
        writeln!(out, "Custom category paths:")?;
        for label in config.category_paths.keys() {
            writeln!(out, "  {label}: {}", resolver.directory_for(label).display())?;
        }
    }

    writeln!(out, "\n[2/4] Scanning files...")?;
    let files = scan_files(&config.source_folder, &config.extensions())?;
    if files.is_empty() {
        writeln!(out, "No files found in {}", config.source_folder.display())?;
        return Ok(outcome);
    }
    writeln!(out, "Found {} files:", files.len())?;
    for (i, name) in files.iter().enumerate() {
        writeln!(out, "  {:2}. {name}", i + 1)?;
    }

    writeln!(out, "\n[3/4] Classifying...")?;
    let plan = ClassificationPlan::new(config, files.clone(), config.categories.clone());
    let mut progress_error = None;
    let classifications = run_classification(state.client.as_ref(), &plan, |event| {
        if let BatchEvent::Started {
            batch,
            total_batches,
            size,
        } = event
        {
            if let Err(err) = writeln!(out, "  batch {batch}/{total_batches} ({size} files)") {
                progress_error.get_or_insert(err);
            }
        }
    })
    .await;
    if let Some(err) = progress_error {
        return Err(err.into());
    }
    writeln!(out, "Received {} classifications", classifications.len())?;

    writeln!(out, "\n[4/4] Filing...")?;
    let filing = file_classified(
        &files,
        &classifications,
        &config.categories,
        &config.source_folder,
        &resolver,
    );
    let run_id = state.journal_filing(&filing.placements);
    print_filing_summary(out, files.len(), &filing, &resolver)?;

    let mut stage = if filing.success_count > 0 {
        WorkflowStage::AwaitingConfirm
    } else {
        writeln!(out, "No file was filed, skipping review and cleanup")?;
        WorkflowStage::Finished
    };

    loop {
        match stage {
            WorkflowStage::AwaitingConfirm => match decisions.confirm_classification()? {
                ReviewDecision::View => print_placements(
                    out,
                    &files,
                    &classifications,
                    &config.categories,
                    &filing,
                )?,
                ReviewDecision::Accept => {
                    writeln!(out, "Classification accepted")?;
                    stage = WorkflowStage::AwaitingCleanupConfirm;
                }
                ReviewDecision::Reject => {
                    writeln!(out, "\nUndoing the filing...")?;
                    let report = rollback(&filing.placements, &config.source_folder);
                    state.journal_mark(run_id.as_deref(), RunState::RolledBack);
                    print_rollback(out, &report)?;
                    outcome.rollback = Some(report);
                    stage = WorkflowStage::RolledBack;
                }
            },
            WorkflowStage::AwaitingCleanupConfirm => {
                if decisions.confirm_cleanup()? {
                    let report = cleanup_sources(
                        &files,
                        &classifications,
                        &config.categories,
                        &config.source_folder,
                        &resolver,
                    );
                    state.journal_mark(run_id.as_deref(), RunState::Cleaned);
                    print_cleanup(out, &report)?;
                    outcome.cleanup = Some(report);
                } else {
                    writeln!(out, "Skipping cleanup, source files kept")?;
                }
                stage = WorkflowStage::Finished;
            }
            WorkflowStage::RolledBack | WorkflowStage::Finished => break,
        }
    }

    outcome.remaining = scan_files(&config.source_folder, &[])?;
    writeln!(out, "\n{RULE}\nFiles left in the source folder: {}", outcome.remaining.len())?;
    for name in &outcome.remaining {
        writeln!(out, "  - {name}")?;
    }
    writeln!(out, "{RULE}")?;
    info!(stage = ?stage, filed = filing.success_count, "offline workflow finished");

    outcome.files = files;
    outcome.classifications = classifications;
    outcome.filing = filing;
    Ok(outcome)
}

fn print_filing_summary<W: Write>(
    out: &mut W,
    total: usize,
    filing: &FilingReport,
    resolver: &CategoryPathResolver,
) -> Result<(), AppError> {
    writeln!(out, "\n{RULE}\nFiling summary\n{RULE}")?;
    writeln!(out, "Total files: {total}")?;
    writeln!(out, "Filed: {}", filing.success_count)?;
    writeln!(out, "Failed or skipped: {}", filing.failed_count)?;
    if !filing.failed_files.is_empty() {
        writeln!(out, "\nThese files could not be filed:")?;
        for name in &filing.failed_files {
            writeln!(out, "  - {name}")?;
        }
    }
    writeln!(out, "\nPer category:")?;
    for (label, count) in &filing.category_stats {
        writeln!(
            out,
            "  {label}: {count} files -> {}",
            resolver.directory_for(label).display()
        )?;
    }
    Ok(())
}

fn print_placements<W: Write>(
    out: &mut W,
    files: &[String],
    classifications: &[usize],
    categories: &[String],
    filing: &FilingReport,
) -> Result<(), AppError> {
    writeln!(out, "\nPlacements:\n{}", "-".repeat(40))?;
    for (name, &idx) in files.iter().zip(classifications) {
        let (Some(label), Some(destination)) =
            (categories.get(idx), filing.placements.destination(name))
        else {
            continue;
        };
        let dir = destination.parent().unwrap_or(destination);
        writeln!(out, "  {name} -> {label} ({})", dir.display())?;
    }
    writeln!(out, "{}", "-".repeat(40))?;
    Ok(())
}

fn print_rollback<W: Write>(out: &mut W, report: &RollbackReport) -> Result<(), AppError> {
    writeln!(out, "Rollback finished:")?;
    writeln!(out, "  removed copies: {}", report.deleted_count)?;
    writeln!(out, "  failed removals: {}", report.failed_to_delete_count)?;
    for name in &report.failed_files {
        writeln!(out, "  - {name}")?;
    }
    writeln!(out, "Source files were left untouched")?;
    Ok(())
}

fn print_cleanup<W: Write>(out: &mut W, report: &CleanupReport) -> Result<(), AppError> {
    writeln!(out, "Cleanup finished:")?;
    writeln!(out, "  deleted sources: {}", report.deleted_count)?;
    writeln!(out, "  failed deletions: {}", report.failed_count)?;
    for failed in &report.failed_files {
        writeln!(out, "  - {}: {}", failed.file, failed.error)?;
    }
    Ok(())
}
