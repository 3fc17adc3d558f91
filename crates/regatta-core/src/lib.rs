//! Core library crate exposing the Regatta signup reconciliation logic.

pub mod actions;
pub mod availability;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod runtime;
pub mod store;

pub use actions::{ActionSource, FormItem, FormResponse, FormsClient, decode_actions};
pub use availability::{NO_RACES_SENTINEL, RaceOption, project_options};
pub use calendar::{
    CalendarClient, CalendarOutcome, CalendarService, EventAttendee, EventPayload, SyncDecision,
    build_event_payload, plan_race_sync, sync_calendar,
};
pub use catalog::{CatalogRow, ingest_catalog, read_catalog};
pub use config::{
    ConfigError, ConfigLoadResult, ConfigSource, FileConfig, FormsSection, KindSection,
    RosterKindConfig, SyncConfig, api_token_from_env, config_directory, config_path, load_config,
    save_config,
};
pub use eligibility::{EligibilityFeed, EligibleUser, SheetClient};
pub use error::{StoreError, SyncError};
pub use logging::{LoggingDestination, LoggingError, init_logging};
pub use model::{ActionEvent, ActionKind, Race, RosterKind, User, normalize_email};
pub use reconcile::{ReconcileOutcome, reconcile};
pub use runtime::{RunSummary, SyncServices, run_sync};
pub use store::{JsonStore, MemoryStore, RosterStore};
