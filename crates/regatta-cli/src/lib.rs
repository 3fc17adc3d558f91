//! CLI wiring for the Regatta sync tool.

pub mod cli_args;

use chrono::Utc;
use regatta_core::{
    JsonStore, LoggingDestination, SyncConfig, SyncError, SyncServices, api_token_from_env,
    init_logging, load_config, run_sync, save_config,
};
use tracing::{info, warn};

use cli_args::Cli;

/// Execute one sync pass from parsed arguments.
///
/// The run start instant is captured before any work happens and becomes the
/// new `last_run` cursor, which is only written back once the whole pass has
/// succeeded. A failed run therefore re-fetches the same responses next time
/// instead of losing them.
pub async fn run(cli: Cli) -> Result<(), SyncError> {
    let destination = if cli.no_log_file {
        LoggingDestination::StderrOnly
    } else {
        LoggingDestination::FileAndStderr
    };
    let log_path =
        init_logging(destination).map_err(|err| SyncError::message(err.to_string()))?;
    if let Some(path) = log_path {
        info!(path = %path.display(), "Persistent log file active");
    }

    let load = load_config(cli.config.as_deref());
    for warning in &load.warnings {
        warn!(%warning, "Configuration warning");
    }
    let mut file_config = load.config;
    if let Some(dir) = &cli.data_dir {
        file_config.data_dir = dir.to_string_lossy().into_owned();
    }

    let run_started_at = Utc::now();
    let config = SyncConfig::from_file(&file_config);
    info!(
        source = ?load.source,
        last_run = %config.last_run,
        data_dir = %config.data_dir.display(),
        "Starting sync run"
    );

    let token = api_token_from_env();
    if token.is_none() {
        warn!("No API token in the environment; requests go out unauthenticated");
    }
    let services = SyncServices::over_http(&config, token);
    let mut store = JsonStore::open(&config.roster_path())?;

    let summary = run_sync(&mut store, &services, &config, cli.force, run_started_at).await?;
    info!(
        races_created = summary.races_created,
        eligible_users = summary.eligible_users,
        events_processed = summary.events_processed,
        events_dropped = summary.events_dropped,
        options_published = summary.options_published,
        races_touched = summary.races_touched,
        events_created = summary.calendar.created,
        events_updated = summary.calendar.updated,
        events_left_alone = summary.calendar.skipped,
        "Sync run complete"
    );

    file_config.last_run = run_started_at;
    save_config(&file_config, cli.config.as_deref())
        .map_err(|err| SyncError::Config(format!("failed to persist run cursor: {err}")))?;
    Ok(())
}
