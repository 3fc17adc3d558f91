use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::model::{RosterKind, normalize_email};

const CONFIG_DIR_NAME: &str = "regatta";
const CONFIG_FILE_NAME: &str = "config.toml";
const CURRENT_SCHEMA_VERSION: u32 = 1;
const DEFAULT_TIMEZONE: &str = "America/New_York";
const API_TOKEN_ENV: &str = "REGATTA_API_TOKEN";

pub const ROSTER_FILE_NAME: &str = "roster.json";
pub const RACES_FILE_NAME: &str = "races.csv";

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No persisted configuration was found or usable; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

/// Errors that can occur when persisting configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Ser(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {err}"),
            ConfigError::Ser(err) => write!(f, "TOML serialization error: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Ser(value)
    }
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    /// Cursor for form-response fetching; rewritten after each successful run.
    #[serde(default = "FileConfig::default_last_run")]
    pub last_run: DateTime<Utc>,
    #[serde(default = "FileConfig::default_data_dir")]
    pub data_dir: String,
    #[serde(default = "FileConfig::default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub calendar_id: String,
    #[serde(default)]
    pub eligibility_sheet_id: String,
    /// Feed rows with a membership year below this are skipped. Zero admits
    /// every row.
    #[serde(default)]
    pub membership_year_floor: i32,
    #[serde(default = "FileConfig::default_rental_allowance")]
    pub rental_allowance: i64,
    #[serde(default = "FileConfig::default_event_start_offset_hours")]
    pub event_start_offset_hours: i64,
    #[serde(default = "FileConfig::default_event_duration_hours")]
    pub event_duration_hours: i64,
    #[serde(default)]
    pub forms_api_url: String,
    #[serde(default)]
    pub calendar_api_url: String,
    #[serde(default)]
    pub sheets_api_url: String,
    #[serde(default)]
    pub forms: FormsSection,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            last_run: Self::default_last_run(),
            data_dir: Self::default_data_dir(),
            timezone: Self::default_timezone(),
            calendar_id: String::new(),
            eligibility_sheet_id: String::new(),
            membership_year_floor: 0,
            rental_allowance: Self::default_rental_allowance(),
            event_start_offset_hours: Self::default_event_start_offset_hours(),
            event_duration_hours: Self::default_event_duration_hours(),
            forms_api_url: String::new(),
            calendar_api_url: String::new(),
            sheets_api_url: String::new(),
            forms: FormsSection::default(),
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }

    /// A fresh install starts its cursor at "now" so the first run only sees
    /// responses submitted after setup.
    fn default_last_run() -> DateTime<Utc> {
        Utc::now()
    }

    fn default_data_dir() -> String {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .to_string_lossy()
            .into_owned()
    }

    fn default_timezone() -> String {
        DEFAULT_TIMEZONE.to_string()
    }

    const fn default_rental_allowance() -> i64 {
        7
    }

    const fn default_event_start_offset_hours() -> i64 {
        10
    }

    const fn default_event_duration_hours() -> i64 {
        8
    }
}

/// Per-roster-kind form settings. Absent fields fall back to the kind's
/// defaults; `visibility_days <= 0` disables the window and a negative
/// `entry_limit` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindSection {
    #[serde(default)]
    pub form_code: String,
    #[serde(default)]
    pub visibility_days: Option<i64>,
    #[serde(default)]
    pub entry_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormsSection {
    #[serde(default)]
    pub organizers: KindSection,
    #[serde(default)]
    pub renters: KindSection,
}

const fn default_visibility_days(kind: RosterKind) -> i64 {
    match kind {
        RosterKind::Organizers => 30,
        RosterKind::Renters => 6,
    }
}

const fn default_entry_limit(kind: RosterKind) -> i64 {
    match kind {
        RosterKind::Organizers => -1,
        RosterKind::Renters => 7,
    }
}

/// Resolved policy for one roster kind: which form feeds it, when races
/// become selectable, how many slots exist, and who may act.
#[derive(Debug, Clone)]
pub struct RosterKindConfig {
    pub kind: RosterKind,
    pub form_code: String,
    pub visibility: Option<Duration>,
    pub entry_limit: Option<i64>,
    /// Normalized emails allowed to act on this kind; `None` means everyone.
    pub eligibility: Option<HashSet<String>>,
}

impl RosterKindConfig {
    pub fn from_section(kind: RosterKind, section: &KindSection) -> Self {
        let days = section
            .visibility_days
            .unwrap_or_else(|| default_visibility_days(kind));
        let limit = section
            .entry_limit
            .unwrap_or_else(|| default_entry_limit(kind));
        RosterKindConfig {
            kind,
            form_code: section.form_code.trim().to_string(),
            visibility: (days > 0).then(|| Duration::days(days)),
            entry_limit: (limit >= 0).then_some(limit),
            eligibility: None,
        }
    }

    pub fn with_eligibility(mut self, emails: HashSet<String>) -> Self {
        self.eligibility = Some(emails);
        self
    }

    pub fn permits(&self, email: &str) -> bool {
        match &self.eligibility {
            None => true,
            Some(allowed) => allowed.contains(&normalize_email(email)),
        }
    }
}

/// Immutable runtime configuration threaded through every entry point.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub timezone: Tz,
    pub calendar_id: String,
    pub eligibility_sheet_id: String,
    pub membership_year_floor: i32,
    pub rental_allowance: i64,
    pub event_start_offset: Duration,
    pub event_duration: Duration,
    pub forms_api_url: String,
    pub calendar_api_url: String,
    pub sheets_api_url: String,
    pub last_run: DateTime<Utc>,
    pub organizers: RosterKindConfig,
    pub renters: RosterKindConfig,
}

impl SyncConfig {
    /// Build the runtime view of a sanitized [`FileConfig`].
    pub fn from_file(file: &FileConfig) -> SyncConfig {
        SyncConfig {
            data_dir: PathBuf::from(&file.data_dir),
            timezone: file
                .timezone
                .parse()
                .unwrap_or(chrono_tz::America::New_York),
            calendar_id: file.calendar_id.trim().to_string(),
            eligibility_sheet_id: file.eligibility_sheet_id.trim().to_string(),
            membership_year_floor: file.membership_year_floor,
            rental_allowance: file.rental_allowance,
            event_start_offset: Duration::hours(file.event_start_offset_hours),
            event_duration: Duration::hours(file.event_duration_hours),
            forms_api_url: file.forms_api_url.trim().to_string(),
            calendar_api_url: file.calendar_api_url.trim().to_string(),
            sheets_api_url: file.sheets_api_url.trim().to_string(),
            last_run: file.last_run,
            organizers: RosterKindConfig::from_section(RosterKind::Organizers, &file.forms.organizers),
            renters: RosterKindConfig::from_section(RosterKind::Renters, &file.forms.renters),
        }
    }

    pub fn roster_path(&self) -> PathBuf {
        self.data_dir.join(ROSTER_FILE_NAME)
    }

    pub fn races_path(&self) -> PathBuf {
        self.data_dir.join(RACES_FILE_NAME)
    }
}

/// Bearer token for the external APIs, taken from the environment so it never
/// lands in the config file.
pub fn api_token_from_env() -> Option<String> {
    std::env::var(API_TOKEN_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Load the configuration from `override_path` or the default location,
/// falling back to defaults when nothing usable exists.
pub fn load_config(override_path: Option<&Path>) -> ConfigLoadResult {
    let mut warnings = Vec::new();
    let path = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_path);

    if path.exists() {
        match fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => {
                    warnings.push(format!(
                        "Failed to parse {} as TOML: {}. Falling back to defaults.",
                        path.display(),
                        err
                    ));
                }
            },
            Err(err) => {
                warnings.push(format!(
                    "Failed to read {}: {}. Falling back to defaults.",
                    path.display(),
                    err
                ));
            }
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

/// Persist the configuration to `override_path` or the default location.
pub fn save_config(config: &FileConfig, override_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown config schema version {}. Resetting to {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        return (FileConfig::default(), warnings);
    }

    if config.timezone.parse::<Tz>().is_err() {
        warnings.push(format!(
            "Unknown timezone '{}'. Resetting to {}.",
            config.timezone, DEFAULT_TIMEZONE
        ));
        config.timezone = DEFAULT_TIMEZONE.to_string();
    }

    if config.data_dir.trim().is_empty() {
        warnings.push("Empty data_dir. Resetting to the default data directory.".to_string());
        config.data_dir = FileConfig::default_data_dir();
    }

    if config.event_duration_hours <= 0 {
        warnings.push(format!(
            "event_duration_hours must be positive, got {}. Resetting to {}.",
            config.event_duration_hours,
            FileConfig::default_event_duration_hours()
        ));
        config.event_duration_hours = FileConfig::default_event_duration_hours();
    }

    if config.event_start_offset_hours < 0 {
        warnings.push(format!(
            "event_start_offset_hours must not be negative, got {}. Resetting to {}.",
            config.event_start_offset_hours,
            FileConfig::default_event_start_offset_hours()
        ));
        config.event_start_offset_hours = FileConfig::default_event_start_offset_hours();
    }

    if config.rental_allowance < 0 {
        warnings.push(format!(
            "rental_allowance must not be negative, got {}. Resetting to 0.",
            config.rental_allowance
        ));
        config.rental_allowance = 0;
    }

    if config.membership_year_floor < 0 {
        warnings.push(format!(
            "membership_year_floor must not be negative, got {}. Resetting to 0.",
            config.membership_year_floor
        ));
        config.membership_year_floor = 0;
    }

    (config, warnings)
}
