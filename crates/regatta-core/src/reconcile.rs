use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::RosterKindConfig;
use crate::error::SyncError;
use crate::model::{ActionEvent, ActionKind, User, race_name_fragment};
use crate::store::RosterStore;

/// What one reconciliation pass did. `touched` holds the name of every race
/// an event resolved against, whether or not the action was applied; the
/// calendar pass uses it to decide what to refresh.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub touched: BTreeSet<String>,
    pub processed: usize,
    pub skipped_unknown_race: usize,
    pub dropped_ineligible: usize,
    pub dropped_full: usize,
}

/// Apply an ordered event sequence to the store for one roster kind.
///
/// Events must already be sorted by submission time; each one mutates shared
/// race state, so order decides who takes the last open slot. Per event the
/// acting user is first removed from the roster, then re-added only for an
/// eligible Signup with room left. The removal is written back even when the
/// action itself is dropped, so an ineligible event still nets out to
/// "ensure absent". An eligible Cancel empties the entire roster for that
/// race and kind, not just the acting user.
pub fn reconcile<S: RosterStore>(
    store: &mut S,
    config: &RosterKindConfig,
    events: &[ActionEvent],
) -> Result<ReconcileOutcome, SyncError> {
    let mut outcome = ReconcileOutcome::default();

    for event in events {
        let mut user = store.find_or_create_user(&event.email)?;
        user.name = event.name.clone();
        store.save_user(&user)?;

        let race_name = race_name_fragment(&event.race_label);
        let Some(race) = store.find_race(race_name)? else {
            warn!(
                race = race_name,
                label = %event.race_label,
                "No race matches this label; skipping event"
            );
            outcome.skipped_unknown_race += 1;
            continue;
        };

        let mut members: Vec<User> = race
            .roster(config.kind)
            .iter()
            .filter(|member| member.email != user.email)
            .cloned()
            .collect();

        if config.permits(&user.email) {
            match event.kind {
                ActionKind::Signup => {
                    let has_room = config
                        .entry_limit
                        .is_none_or(|limit| (members.len() as i64) < limit);
                    if has_room {
                        members.push(user.clone());
                    } else {
                        debug!(
                            user = %user.email,
                            race = %race.name,
                            "Signup dropped, no slots remaining"
                        );
                        outcome.dropped_full += 1;
                    }
                }
                ActionKind::Cancel => members.clear(),
            }
        } else {
            debug!(user = %user.email, race = %race.name, "User not eligible; action dropped");
            outcome.dropped_ineligible += 1;
        }

        info!(
            user = %user.email,
            action = ?event.kind,
            kind = config.kind.label(),
            race = %race.name,
            members = members.len(),
            "Reconciled action"
        );

        store.write_roster(race.id, config.kind, &members)?;
        outcome.touched.insert(race.name.clone());
        outcome.processed += 1;
    }

    Ok(outcome)
}
