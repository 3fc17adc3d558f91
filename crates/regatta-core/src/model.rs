use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A person known to the roster store. `email` is the identity and is always
/// stored normalized (trimmed, lowercased); `name` is the latest display name
/// seen from either the eligibility feed or a form response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
}

/// The fixed set of roster kinds. Dispatch to the matching membership list on
/// [`Race`] goes through [`Race::roster`] / [`Race::roster_mut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RosterKind {
    Organizers,
    Renters,
}

impl RosterKind {
    pub const ALL: [RosterKind; 2] = [RosterKind::Organizers, RosterKind::Renters];

    /// Role label used in calendar descriptions and log lines.
    pub fn label(self) -> &'static str {
        match self {
            RosterKind::Organizers => "Organizers",
            RosterKind::Renters => "Renters",
        }
    }
}

/// A race from the catalog, with both rosters loaded. `external_event_id` is
/// set once the calendar event exists and is never cleared afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Race {
    pub id: u64,
    pub name: String,
    pub date: NaiveDate,
    pub external_event_id: Option<String>,
    pub organizers: Vec<User>,
    pub renters: Vec<User>,
}

impl Race {
    pub fn roster(&self, kind: RosterKind) -> &[User] {
        match kind {
            RosterKind::Organizers => &self.organizers,
            RosterKind::Renters => &self.renters,
        }
    }

    pub fn roster_mut(&mut self, kind: RosterKind) -> &mut Vec<User> {
        match kind {
            RosterKind::Organizers => &mut self.organizers,
            RosterKind::Renters => &mut self.renters,
        }
    }

    /// Start of the race day in the event timezone. Races carry no
    /// time-of-day; midnight local is the reference point that the calendar
    /// start offset is added to.
    pub fn starts_at(&self, tz: Tz) -> DateTime<Tz> {
        let midnight = self.date.and_time(NaiveTime::MIN);
        match midnight.and_local_timezone(tz) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => tz.from_utc_datetime(&midnight),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Signup,
    Cancel,
}

impl ActionKind {
    /// Case-insensitive parse of the form's action answer.
    pub fn parse(text: &str) -> Option<ActionKind> {
        match text.trim().to_lowercase().as_str() {
            "signup" => Some(ActionKind::Signup),
            "cancel" => Some(ActionKind::Cancel),
            _ => None,
        }
    }
}

/// One decoded signup/cancel intent: a single response fans out into one
/// event per selected race label, all sharing the user and action. Transient,
/// rebuilt from the form on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEvent {
    pub email: String,
    pub name: String,
    /// The raw selected option label; the race name is extracted with
    /// [`race_name_fragment`] at reconciliation time.
    pub race_label: String,
    pub kind: ActionKind,
    pub submitted_at: DateTime<Utc>,
}

/// Canonical form of an email for identity comparison.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The race name inside an option label: everything before the first `-`,
/// trimmed. Labels look like "Spring Cup - 2024-06-01 (2 Remaining)".
pub fn race_name_fragment(label: &str) -> &str {
    label.split('-').next().unwrap_or(label).trim()
}
