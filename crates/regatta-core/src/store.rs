use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Race, RosterKind, User, normalize_email};

pub const STORE_SCHEMA_VERSION: u32 = 1;

/// Persistence over races, users, and per-kind membership lists. Lookup
/// misses come back as `None`; only real persistence failures are errors.
/// `find_race` returns the first match in insertion order, so two races
/// sharing a name resolve to whichever was created first.
pub trait RosterStore {
    fn find_or_create_user(&mut self, email: &str) -> Result<User, StoreError>;
    /// Upserts the user and refreshes the name on any roster copies.
    fn save_user(&mut self, user: &User) -> Result<(), StoreError>;
    fn find_race(&self, name: &str) -> Result<Option<Race>, StoreError>;
    fn find_race_on(&self, name: &str, date: NaiveDate) -> Result<Option<Race>, StoreError>;
    fn create_race(&mut self, name: &str, date: NaiveDate) -> Result<Race, StoreError>;
    fn read_roster(&self, race_id: u64, kind: RosterKind) -> Result<Vec<User>, StoreError>;
    fn write_roster(
        &mut self,
        race_id: u64,
        kind: RosterKind,
        members: &[User],
    ) -> Result<(), StoreError>;
    /// Replaces the stored race wholesale, rosters included.
    fn save_race(&mut self, race: &Race) -> Result<(), StoreError>;
    /// All races in insertion order, rosters loaded.
    fn list_races(&self) -> Result<Vec<Race>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreState {
    schema_version: u32,
    next_race_id: u64,
    users: Vec<User>,
    races: Vec<Race>,
}

impl Default for StoreState {
    fn default() -> Self {
        StoreState {
            schema_version: STORE_SCHEMA_VERSION,
            next_race_id: 1,
            users: Vec::new(),
            races: Vec::new(),
        }
    }
}

impl StoreState {
    fn find_or_create_user(&mut self, email: &str) -> User {
        let email = normalize_email(email);
        if let Some(user) = self.users.iter().find(|u| u.email == email) {
            return user.clone();
        }
        let user = User {
            email,
            name: String::new(),
        };
        self.users.push(user.clone());
        user
    }

    fn save_user(&mut self, user: &User) {
        let email = normalize_email(&user.email);
        match self.users.iter_mut().find(|u| u.email == email) {
            Some(existing) => existing.name = user.name.clone(),
            None => self.users.push(User {
                email: email.clone(),
                name: user.name.clone(),
            }),
        }
        for race in &mut self.races {
            for kind in RosterKind::ALL {
                for member in race.roster_mut(kind) {
                    if member.email == email {
                        member.name = user.name.clone();
                    }
                }
            }
        }
    }

    fn find_race(&self, name: &str) -> Option<Race> {
        self.races.iter().find(|r| r.name == name).cloned()
    }

    fn find_race_on(&self, name: &str, date: NaiveDate) -> Option<Race> {
        self.races
            .iter()
            .find(|r| r.name == name && r.date == date)
            .cloned()
    }

    fn create_race(&mut self, name: &str, date: NaiveDate) -> Race {
        let race = Race {
            id: self.next_race_id,
            name: name.to_string(),
            date,
            external_event_id: None,
            organizers: Vec::new(),
            renters: Vec::new(),
        };
        self.next_race_id += 1;
        self.races.push(race.clone());
        race
    }

    fn read_roster(&self, race_id: u64, kind: RosterKind) -> Vec<User> {
        self.races
            .iter()
            .find(|r| r.id == race_id)
            .map(|r| r.roster(kind).to_vec())
            .unwrap_or_default()
    }

    fn write_roster(&mut self, race_id: u64, kind: RosterKind, members: &[User]) {
        if let Some(race) = self.races.iter_mut().find(|r| r.id == race_id) {
            *race.roster_mut(kind) = members.to_vec();
        }
    }

    fn save_race(&mut self, race: &Race) {
        match self.races.iter_mut().find(|r| r.id == race.id) {
            Some(existing) => *existing = race.clone(),
            None => self.races.push(race.clone()),
        }
    }
}

/// File-backed store. Every mutation rewrites the whole file atomically, so
/// a later step in the same run always observes earlier writes and a crash
/// never leaves a half-written file behind.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    state: StoreState,
}

impl JsonStore {
    pub fn open(path: &Path) -> Result<JsonStore, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let state = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            StoreState::default()
        };
        Ok(JsonStore {
            path: path.to_path_buf(),
            state,
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let serialized = serde_json::to_string_pretty(&self.state)?;
        let temp_path = build_temp_path(&self.path);
        fs::write(&temp_path, format!("{serialized}\n"))?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}

impl RosterStore for JsonStore {
    fn find_or_create_user(&mut self, email: &str) -> Result<User, StoreError> {
        let user = self.state.find_or_create_user(email);
        self.flush()?;
        Ok(user)
    }

    fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.state.save_user(user);
        self.flush()
    }

    fn find_race(&self, name: &str) -> Result<Option<Race>, StoreError> {
        Ok(self.state.find_race(name))
    }

    fn find_race_on(&self, name: &str, date: NaiveDate) -> Result<Option<Race>, StoreError> {
        Ok(self.state.find_race_on(name, date))
    }

    fn create_race(&mut self, name: &str, date: NaiveDate) -> Result<Race, StoreError> {
        let race = self.state.create_race(name, date);
        self.flush()?;
        Ok(race)
    }

    fn read_roster(&self, race_id: u64, kind: RosterKind) -> Result<Vec<User>, StoreError> {
        Ok(self.state.read_roster(race_id, kind))
    }

    fn write_roster(
        &mut self,
        race_id: u64,
        kind: RosterKind,
        members: &[User],
    ) -> Result<(), StoreError> {
        self.state.write_roster(race_id, kind, members);
        self.flush()
    }

    fn save_race(&mut self, race: &Race) -> Result<(), StoreError> {
        self.state.save_race(race);
        self.flush()
    }

    fn list_races(&self) -> Result<Vec<Race>, StoreError> {
        Ok(self.state.races.clone())
    }
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl RosterStore for MemoryStore {
    fn find_or_create_user(&mut self, email: &str) -> Result<User, StoreError> {
        Ok(self.state.find_or_create_user(email))
    }

    fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.state.save_user(user);
        Ok(())
    }

    fn find_race(&self, name: &str) -> Result<Option<Race>, StoreError> {
        Ok(self.state.find_race(name))
    }

    fn find_race_on(&self, name: &str, date: NaiveDate) -> Result<Option<Race>, StoreError> {
        Ok(self.state.find_race_on(name, date))
    }

    fn create_race(&mut self, name: &str, date: NaiveDate) -> Result<Race, StoreError> {
        Ok(self.state.create_race(name, date))
    }

    fn read_roster(&self, race_id: u64, kind: RosterKind) -> Result<Vec<User>, StoreError> {
        Ok(self.state.read_roster(race_id, kind))
    }

    fn write_roster(
        &mut self,
        race_id: u64,
        kind: RosterKind,
        members: &[User],
    ) -> Result<(), StoreError> {
        self.state.write_roster(race_id, kind, members);
        Ok(())
    }

    fn save_race(&mut self, race: &Race) -> Result<(), StoreError> {
        self.state.save_race(race);
        Ok(())
    }

    fn list_races(&self) -> Result<Vec<Race>, StoreError> {
        Ok(self.state.races.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, name: &str) -> User {
        User {
            email: email.into(),
            name: name.into(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn find_or_create_normalizes_email() {
        let mut store = MemoryStore::new();
        let created = store.find_or_create_user("  Alice@Example.COM ").unwrap();
        assert_eq!(created.email, "alice@example.com");
        let found = store.find_or_create_user("alice@example.com").unwrap();
        assert_eq!(found, created);
    }

    #[test]
    fn save_user_refreshes_roster_copies() {
        let mut store = MemoryStore::new();
        let race = store.create_race("Spring Cup", date(2024, 6, 1)).unwrap();
        let alice = store.find_or_create_user("alice@example.com").unwrap();
        store
            .write_roster(race.id, RosterKind::Renters, &[alice.clone()])
            .unwrap();

        store.save_user(&user("alice@example.com", "Alice A")).unwrap();

        let roster = store.read_roster(race.id, RosterKind::Renters).unwrap();
        assert_eq!(roster[0].name, "Alice A");
    }

    #[test]
    fn find_race_returns_first_created_for_duplicate_names() {
        let mut store = MemoryStore::new();
        let first = store.create_race("Time Trial", date(2024, 6, 1)).unwrap();
        let second = store.create_race("Time Trial", date(2024, 7, 1)).unwrap();
        assert_ne!(first.id, second.id);

        let found = store.find_race("Time Trial").unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.date, date(2024, 6, 1));
    }

    #[test]
    fn find_race_on_matches_name_and_date() {
        let mut store = MemoryStore::new();
        store.create_race("Time Trial", date(2024, 6, 1)).unwrap();
        assert!(store.find_race_on("Time Trial", date(2024, 6, 1)).unwrap().is_some());
        assert!(store.find_race_on("Time Trial", date(2024, 6, 2)).unwrap().is_none());
    }

    #[test]
    fn json_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");

        {
            let mut store = JsonStore::open(&path).unwrap();
            let mut race = store.create_race("Spring Cup", date(2024, 6, 1)).unwrap();
            let alice = store.find_or_create_user("alice@example.com").unwrap();
            store.save_user(&user(&alice.email, "Alice")).unwrap();
            store
                .write_roster(race.id, RosterKind::Organizers, &[user("alice@example.com", "Alice")])
                .unwrap();
            race.external_event_id = Some("evt-1".into());
            store.save_race(&race).unwrap();
        }

        let store = JsonStore::open(&path).unwrap();
        let races = store.list_races().unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].external_event_id.as_deref(), Some("evt-1"));
        let roster = store.read_roster(races[0].id, RosterKind::Organizers).unwrap();
        assert_eq!(roster, vec![user("alice@example.com", "Alice")]);
    }

    #[test]
    fn json_store_ids_keep_increasing_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");

        let first_id = {
            let mut store = JsonStore::open(&path).unwrap();
            store.create_race("A", date(2024, 6, 1)).unwrap().id
        };
        let second_id = {
            let mut store = JsonStore::open(&path).unwrap();
            store.create_race("B", date(2024, 6, 2)).unwrap().id
        };
        assert!(second_id > first_id);
    }
}
