use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use crate::error::SyncError;
use crate::store::RosterStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub name: String,
    pub date: NaiveDate,
}

/// Parse the race catalog file: a header row, then `Name,Date` rows with ISO
/// dates. A missing file is an empty catalog, not an error.
pub fn read_catalog(path: &Path) -> Result<Vec<CatalogRow>, SyncError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    parse_catalog(&fs::read_to_string(path)?)
}

fn parse_catalog(raw: &str) -> Result<Vec<CatalogRow>, SyncError> {
    let mut rows = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if index == 0 || line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let name = fields.next().unwrap_or("").trim();
        let date_text = fields.next().unwrap_or("").trim();
        if name.is_empty() || date_text.is_empty() {
            return Err(SyncError::message(format!(
                "malformed catalog row {}: '{}'",
                index + 1,
                line
            )));
        }
        let date = NaiveDate::parse_from_str(date_text, "%Y-%m-%d").map_err(|err| {
            SyncError::message(format!(
                "invalid date '{}' in catalog row {}: {}",
                date_text,
                index + 1,
                err
            ))
        })?;
        rows.push(CatalogRow {
            name: name.to_string(),
            date,
        });
    }
    Ok(rows)
}

/// Upsert catalog rows into the store, keyed by (name, date). Returns how
/// many races were newly created.
pub fn ingest_catalog<S: RosterStore>(store: &mut S, path: &Path) -> Result<usize, SyncError> {
    let mut created = 0;
    for row in read_catalog(path)? {
        if store.find_race_on(&row.name, row.date)?.is_none() {
            store.create_race(&row.name, row.date)?;
            info!(race = %row.name, date = %row.date, "Created race from catalog");
            created += 1;
        }
    }
    Ok(created)
}
