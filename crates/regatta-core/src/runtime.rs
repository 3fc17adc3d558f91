use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::actions::{ActionSource, FormsClient};
use crate::availability::project_options;
use crate::calendar::{CalendarClient, CalendarOutcome, CalendarService, sync_calendar};
use crate::catalog::ingest_catalog;
use crate::config::{RosterKindConfig, SyncConfig};
use crate::eligibility::{EligibilityFeed, SheetClient};
use crate::error::SyncError;
use crate::reconcile::{ReconcileOutcome, reconcile};
use crate::store::RosterStore;

/// External services a sync run talks to. Fakes slot in here for tests.
pub struct SyncServices<A, C, E>
where
    A: ActionSource,
    C: CalendarService,
    E: EligibilityFeed,
{
    pub actions: A,
    pub calendar: C,
    pub eligibility: E,
}

impl SyncServices<FormsClient, CalendarClient, SheetClient> {
    /// Wire the HTTP-backed services from the configured endpoints, sharing
    /// one connection pool.
    pub fn over_http(config: &SyncConfig, token: Option<String>) -> Self {
        let client = reqwest::Client::new();
        SyncServices {
            actions: FormsClient::new(client.clone(), &config.forms_api_url, token.clone()),
            calendar: CalendarClient::new(client.clone(), &config.calendar_api_url, token.clone()),
            eligibility: SheetClient::new(
                client,
                &config.sheets_api_url,
                &config.eligibility_sheet_id,
                config.membership_year_floor,
                token,
            ),
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub races_created: usize,
    pub eligible_users: usize,
    pub events_processed: usize,
    pub events_dropped: usize,
    pub options_published: usize,
    pub races_touched: usize,
    pub calendar: CalendarOutcome,
}

/// One full sync pass: ingest the race catalog, refresh eligibility, then
/// per roster kind pull form responses since the last run, reconcile them,
/// and publish the refreshed option list; finally bring calendar events in
/// line with the touched races.
///
/// `now` is the caller's run start instant. It bounds race visibility for
/// this pass and becomes the next `last_run` cursor once the caller persists
/// it, so responses landing mid-run are picked up next time.
pub async fn run_sync<S, A, C, E>(
    store: &mut S,
    services: &SyncServices<A, C, E>,
    config: &SyncConfig,
    force_calendar: bool,
    now: DateTime<Utc>,
) -> Result<RunSummary, SyncError>
where
    S: RosterStore,
    A: ActionSource,
    C: CalendarService,
    E: EligibilityFeed,
{
    let mut summary = RunSummary::default();

    summary.races_created = ingest_catalog(store, &config.races_path())?;

    let eligible_emails = refresh_eligibility(store, services, config, &mut summary).await?;
    let renters = match eligible_emails {
        Some(emails) => config.renters.clone().with_eligibility(emails),
        None => config.renters.clone(),
    };
    let kinds = [config.organizers.clone(), renters];

    let mut touched = BTreeSet::new();
    for kind_config in &kinds {
        if kind_config.form_code.is_empty() {
            debug!(kind = kind_config.kind.label(), "No form configured; skipping kind");
            continue;
        }
        let events = services
            .actions
            .list_actions_since(&kind_config.form_code, config.last_run)
            .await?;
        info!(
            kind = kind_config.kind.label(),
            events = events.len(),
            since = %config.last_run,
            "Fetched form responses"
        );

        let ReconcileOutcome {
            touched: kind_touched,
            processed,
            skipped_unknown_race,
            dropped_ineligible,
            dropped_full,
        } = reconcile(store, kind_config, &events)?;
        summary.events_processed += processed;
        summary.events_dropped += skipped_unknown_race + dropped_ineligible + dropped_full;
        touched.extend(kind_touched);

        publish_kind_options(store, services, kind_config, config, now, &mut summary).await?;
    }
    summary.races_touched = touched.len();

    if config.calendar_id.is_empty() {
        warn!("No calendar configured; skipping calendar sync");
    } else {
        summary.calendar =
            sync_calendar(store, &services.calendar, config, &touched, force_calendar).await?;
    }

    Ok(summary)
}

/// Pull the membership feed and mirror it into the user table. Returns the
/// admitted email set, or `None` when no sheet is configured and renters
/// stay ungated.
async fn refresh_eligibility<S, A, C, E>(
    store: &mut S,
    services: &SyncServices<A, C, E>,
    config: &SyncConfig,
    summary: &mut RunSummary,
) -> Result<Option<HashSet<String>>, SyncError>
where
    S: RosterStore,
    A: ActionSource,
    C: CalendarService,
    E: EligibilityFeed,
{
    if config.eligibility_sheet_id.is_empty() {
        warn!("No eligibility sheet configured; renters stay ungated");
        return Ok(None);
    }

    let entries = services.eligibility.list_eligible_users().await?;
    let mut emails = HashSet::with_capacity(entries.len());
    for entry in &entries {
        let mut user = store.find_or_create_user(&entry.email)?;
        user.name = entry.name.clone();
        store.save_user(&user)?;
        emails.insert(user.email);
    }
    summary.eligible_users = entries.len();
    info!(users = entries.len(), "Refreshed eligibility feed");
    Ok(Some(emails))
}

async fn publish_kind_options<S, A, C, E>(
    store: &mut S,
    services: &SyncServices<A, C, E>,
    kind_config: &RosterKindConfig,
    config: &SyncConfig,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) -> Result<(), SyncError>
where
    S: RosterStore,
    A: ActionSource,
    C: CalendarService,
    E: EligibilityFeed,
{
    let races = store.list_races()?;
    let options = project_options(&races, kind_config, config.timezone, now);
    let labels: Vec<String> = options.into_iter().map(|option| option.label).collect();
    services
        .actions
        .publish_options(&kind_config.form_code, &labels)
        .await?;
    info!(
        kind = kind_config.kind.label(),
        options = labels.len(),
        "Published race options"
    );
    summary.options_published += labels.len();
    Ok(())
}
