use std::io;

use thiserror::Error;

/// Failure of the roster store itself. Lookup misses are not errors; store
/// methods return `Option` for those.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Anything that aborts a sync run. The orchestrator maps these to process
/// exit; components never exit on their own.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Message(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("form response is missing a '{0}' answer")]
    MissingField(String),
    #[error("unknown action '{0}' in form response")]
    UnknownAction(String),
    #[error("{service} error: {detail}")]
    Service { service: &'static str, detail: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn message<T: Into<String>>(message: T) -> Self {
        SyncError::Message(message.into())
    }

    pub fn service<T: Into<String>>(service: &'static str, detail: T) -> Self {
        SyncError::Service {
            service,
            detail: detail.into(),
        }
    }
}
