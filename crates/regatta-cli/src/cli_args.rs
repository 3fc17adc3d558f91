use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueHint};

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Reconcile race signups into rosters, form options, and calendar events", long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to the platform config directory).
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Directory holding the roster store and race catalog.
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// Refresh calendar events even for races this run did not touch.
    #[arg(long, action = ArgAction::SetTrue)]
    pub force: bool,

    /// Log to stderr only, skipping the persistent log file.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_log_file: bool,
}
