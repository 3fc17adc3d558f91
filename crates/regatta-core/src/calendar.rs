use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::model::{Race, RosterKind};
use crate::store::RosterStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttendee {
    pub email: String,
    pub display_name: String,
}

/// Complete calendar event body. Updates send the whole thing, so every
/// field reflects the current roster state rather than a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub summary: String,
    pub description: String,
    /// RFC 3339 instants in the configured event timezone.
    pub start: String,
    pub end: String,
    pub attendees: Vec<EventAttendee>,
}

/// Remote calendar operations needed by the sync pass.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<EventPayload, SyncError>;

    /// Returns the id of the created event.
    async fn create_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<String, SyncError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    Skip,
    Create,
    Update { event_id: String },
}

/// Decide what the calendar pass does for one race. A race with an existing
/// event is skipped unless this run touched it or `force` is set; a race
/// without one is always created, so newly cataloged races get their event
/// on the next run regardless of signup traffic.
pub fn plan_race_sync(race: &Race, touched: &BTreeSet<String>, force: bool) -> SyncDecision {
    match &race.external_event_id {
        Some(_) if !touched.contains(&race.name) && !force => SyncDecision::Skip,
        Some(event_id) => SyncDecision::Update {
            event_id: event_id.clone(),
        },
        None => SyncDecision::Create,
    }
}

/// Build the event body for a race from its current rosters.
///
/// Attendees are the union of every roster kind, deduplicated by email with
/// the later kind winning on display name. The description lists each kind's
/// members by name and closes with the rental equipment still unclaimed.
pub fn build_event_payload(race: &Race, config: &SyncConfig) -> EventPayload {
    let start = race.starts_at(config.timezone) + config.event_start_offset;
    let end = start + config.event_duration;

    let mut attendees: BTreeMap<String, EventAttendee> = BTreeMap::new();
    let mut lines = Vec::new();
    for kind in RosterKind::ALL {
        let members = race.roster(kind);
        for member in members {
            attendees.insert(
                member.email.clone(),
                EventAttendee {
                    email: member.email.clone(),
                    display_name: member.name.clone(),
                },
            );
        }
        if members.is_empty() {
            lines.push(format!("No {}", kind.label()));
        } else {
            let names: Vec<&str> = members.iter().map(|member| member.name.as_str()).collect();
            lines.push(format!("{}: {}", kind.label(), names.join(", ")));
        }
    }
    lines.push(format!(
        "Rentals Remaining: {}",
        config.rental_allowance - race.roster(RosterKind::Renters).len() as i64
    ));

    EventPayload {
        summary: race.name.clone(),
        description: lines.join("\n"),
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        attendees: attendees.into_values().collect(),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CalendarOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Walk every race and bring its calendar event in line with the store.
///
/// Created event ids are persisted immediately so they survive a failure
/// later in the pass. The pre-update fetch surfaces a dangling event id as
/// an error instead of silently recreating the event.
pub async fn sync_calendar<S, C>(
    store: &mut S,
    calendar: &C,
    config: &SyncConfig,
    touched: &BTreeSet<String>,
    force: bool,
) -> Result<CalendarOutcome, SyncError>
where
    S: RosterStore,
    C: CalendarService + ?Sized,
{
    let mut outcome = CalendarOutcome::default();

    for race in store.list_races()? {
        match plan_race_sync(&race, touched, force) {
            SyncDecision::Skip => {
                outcome.skipped += 1;
            }
            SyncDecision::Create => {
                let payload = build_event_payload(&race, config);
                let event_id = calendar.create_event(&config.calendar_id, &payload).await?;
                info!(race = %race.name, event = %event_id, "Created calendar event");

                let mut updated = race.clone();
                updated.external_event_id = Some(event_id);
                store.save_race(&updated)?;
                outcome.created += 1;
            }
            SyncDecision::Update { event_id } => {
                calendar.get_event(&config.calendar_id, &event_id).await?;
                let payload = build_event_payload(&race, config);
                calendar
                    .update_event(&config.calendar_id, &event_id, &payload)
                    .await?;
                info!(race = %race.name, event = %event_id, "Updated calendar event");
                outcome.updated += 1;
            }
        }
    }

    Ok(outcome)
}

/// HTTP-backed [`CalendarService`].
pub struct CalendarClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl CalendarClient {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<String>) -> CalendarClient {
        CalendarClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl CalendarService for CalendarClient {
    async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<EventPayload, SyncError> {
        let url = format!(
            "{}/v1/calendars/{}/events/{}",
            self.base_url, calendar_id, event_id
        );
        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::service(
                "calendar",
                format!("GET {} responded with {}", url, response.status()),
            ));
        }
        Ok(response.json().await?)
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<String, SyncError> {
        #[derive(Deserialize)]
        struct CreateResponse {
            id: String,
        }

        let url = format!("{}/v1/calendars/{}/events", self.base_url, calendar_id);
        let response = self
            .authorize(self.client.post(&url).json(payload))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::service(
                "calendar",
                format!("POST {} responded with {}", url, response.status()),
            ));
        }
        let body: CreateResponse = response.json().await?;
        Ok(body.id)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<(), SyncError> {
        let url = format!(
            "{}/v1/calendars/{}/events/{}",
            self.base_url, calendar_id, event_id
        );
        let response = self
            .authorize(self.client.put(&url).json(payload))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::service(
                "calendar",
                format!("PUT {} responded with {}", url, response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, SyncConfig};
    use crate::model::User;
    use chrono::NaiveDate;

    fn sample_config() -> SyncConfig {
        let file = FileConfig {
            timezone: "UTC".into(),
            rental_allowance: 7,
            event_start_offset_hours: 10,
            event_duration_hours: 8,
            ..FileConfig::default()
        };
        SyncConfig::from_file(&file)
    }

    fn user(email: &str, name: &str) -> User {
        User {
            email: email.into(),
            name: name.into(),
        }
    }

    fn sample_race() -> Race {
        Race {
            id: 1,
            name: "Spring Cup".into(),
            date: NaiveDate::from_ymd_opt(2026, 9, 2).unwrap(),
            external_event_id: None,
            organizers: vec![user("olive@example.com", "Olive Organizer")],
            renters: vec![
                user("rita@example.com", "Rita Renter"),
                user("ray@example.com", "Ray Renter"),
            ],
        }
    }

    fn touched(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn untouched_races_with_an_event_are_skipped() {
        let mut race = sample_race();
        race.external_event_id = Some("evt-1".into());

        assert_eq!(plan_race_sync(&race, &touched(&[]), false), SyncDecision::Skip);
    }

    #[test]
    fn touched_races_are_updated() {
        let mut race = sample_race();
        race.external_event_id = Some("evt-1".into());

        assert_eq!(
            plan_race_sync(&race, &touched(&["Spring Cup"]), false),
            SyncDecision::Update {
                event_id: "evt-1".into()
            }
        );
    }

    #[test]
    fn force_updates_untouched_races() {
        let mut race = sample_race();
        race.external_event_id = Some("evt-1".into());

        assert_eq!(
            plan_race_sync(&race, &touched(&[]), true),
            SyncDecision::Update {
                event_id: "evt-1".into()
            }
        );
    }

    #[test]
    fn races_without_an_event_are_always_created() {
        let race = sample_race();

        assert_eq!(plan_race_sync(&race, &touched(&[]), false), SyncDecision::Create);
        assert_eq!(
            plan_race_sync(&race, &touched(&["Spring Cup"]), false),
            SyncDecision::Create
        );
    }

    #[test]
    fn payload_covers_summary_times_and_rentals() {
        let payload = build_event_payload(&sample_race(), &sample_config());

        assert_eq!(payload.summary, "Spring Cup");
        assert_eq!(payload.start, "2026-09-02T10:00:00+00:00");
        assert_eq!(payload.end, "2026-09-02T18:00:00+00:00");
        assert!(payload.description.contains("Organizers: Olive Organizer"));
        assert!(payload.description.contains("Renters: Rita Renter, Ray Renter"));
        assert!(payload.description.contains("Rentals Remaining: 5"));
    }

    #[test]
    fn empty_rosters_get_a_no_entries_line() {
        let mut race = sample_race();
        race.organizers.clear();

        let payload = build_event_payload(&race, &sample_config());

        assert!(payload.description.contains("No Organizers"));
        assert!(payload.description.contains("Rentals Remaining: 5"));
    }

    #[test]
    fn attendees_are_deduplicated_by_email() {
        let mut race = sample_race();
        race.organizers = vec![user("both@example.com", "Old Name")];
        race.renters = vec![user("both@example.com", "New Name")];

        let payload = build_event_payload(&race, &sample_config());

        assert_eq!(payload.attendees.len(), 1);
        assert_eq!(payload.attendees[0].display_name, "New Name");
    }

    #[test]
    fn attendees_come_out_sorted_by_email() {
        let payload = build_event_payload(&sample_race(), &sample_config());

        let emails: Vec<_> = payload
            .attendees
            .iter()
            .map(|attendee| attendee.email.as_str())
            .collect();
        assert_eq!(
            emails,
            vec!["olive@example.com", "ray@example.com", "rita@example.com"]
        );
    }
}
