pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use cli::{Cli, Commands};
use commands::offline_workflow::{run_offline, PromptDecisions};
use commands::server;
use config::AppConfig;
use data::repository;
use models::journal::RunState;
use services::llm_service::ChatCompletionClient;
use services::undo_service::rollback;
use state::AppState;

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load_with_api_key(&cli.config, cli.api_key.as_deref())
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let journal = open_configured_journal(&config);

    match cli.command.unwrap_or(Commands::Classify) {
        Commands::Classify => {
            exit_on_interrupt();
            let state = build_state(config, journal)?;
            let mut decisions = PromptDecisions::new(std::io::stdin().lock(), std::io::stdout());
            let mut out = std::io::stdout();
            run_offline(&state, &mut decisions, &mut out)
                .await
                .context("classification run failed")?;
        }
        Commands::Serve { host, port } => {
            let port = port.unwrap_or(config.settings.port);
            let state = Arc::new(build_state(config, journal)?);
            server::serve(state, &host, port)
                .await
                .context("server stopped with an error")?;
        }
        Commands::Recover => recover(journal)?,
    }
    Ok(())
}

fn build_state(
    config: AppConfig,
    journal: Option<rusqlite::Connection>,
) -> anyhow::Result<AppState> {
    let client = ChatCompletionClient::new(&config.api, config.request_timeout())
        .context("failed to build HTTP client")?;
    Ok(AppState::new(config, Arc::new(client), journal))
}

/// Opens the placement journal. Filing still works without one, so failures only warn.
fn open_configured_journal(config: &AppConfig) -> Option<rusqlite::Connection> {
    let path = config
        .settings
        .journal_path
        .clone()
        .unwrap_or_else(data::default_journal_path);
    match data::open_journal(&path) {
        Ok(conn) => {
            info!(path = %path.display(), "placement journal opened");
            Some(conn)
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "placement journal unavailable, filing runs will not be recoverable"
            );
            None
        }
    }
}

/// Ctrl-C during the interactive workflow ends the process cleanly, even while blocked on stdin.
fn exit_on_interrupt() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n\nInterrupted");
            std::process::exit(0);
        }
    });
}

fn recover(journal: Option<rusqlite::Connection>) -> anyhow::Result<()> {
    let conn = journal.context("the placement journal could not be opened")?;
    let Some(run) = repository::latest_run_in_state(&conn, RunState::Placed)? else {
        println!("Nothing to recover");
        return Ok(());
    };

    println!(
        "Rolling back run {} from {} ({} files, source {})",
        run.run_id,
        run.filed_at,
        run.record.len(),
        run.source_folder
    );
    let report = rollback(&run.record, Path::new(&run.source_folder));
    repository::mark_run(&conn, &run.run_id, RunState::RolledBack)?;

    println!("  removed copies: {}", report.deleted_count);
    println!("  already gone: {}", report.skipped_count);
    println!("  failed removals: {}", report.failed_to_delete_count);
    for name in &report.failed_files {
        println!("  - {name}");
    }
    Ok(())
}
