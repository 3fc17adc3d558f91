use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::RosterKindConfig;
use crate::model::Race;

/// Placeholder option published when no race qualifies, so the form always
/// renders at least one choice.
pub const NO_RACES_SENTINEL: &str = "No Races Available";

/// One selectable entry for a signup form. `race_name` is `None` for the
/// sentinel, which never resolves back to a race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceOption {
    pub race_name: Option<String>,
    pub label: String,
}

impl RaceOption {
    fn sentinel() -> Self {
        RaceOption {
            race_name: None,
            label: NO_RACES_SENTINEL.to_string(),
        }
    }
}

/// Project the selectable races for one roster kind at a given instant.
///
/// A race qualifies when its start lies strictly in the future and, when the
/// kind carries a visibility window, `now` has entered that window. Labels
/// embed a capacity hint: remaining slots for limited kinds, a running count
/// for unlimited ones. Store order is preserved.
pub fn project_options(
    races: &[Race],
    config: &RosterKindConfig,
    tz: Tz,
    now: DateTime<Utc>,
) -> Vec<RaceOption> {
    let now = now.with_timezone(&tz);
    let mut options = Vec::new();

    for race in races {
        let starts_at = race.starts_at(tz);
        if starts_at <= now {
            continue;
        }
        if let Some(window) = config.visibility {
            if now <= starts_at - window {
                continue;
            }
        }

        let size = race.roster(config.kind).len() as i64;
        let base = format!("{} - {}", race.name, race.date.format("%Y-%m-%d"));
        let label = match config.entry_limit {
            Some(limit) => format!("{base} ({} Remaining)", limit - size),
            None => format!("{base} ({size} So Far)"),
        };
        options.push(RaceOption {
            race_name: Some(race.name.clone()),
            label,
        });
    }

    if options.is_empty() {
        options.push(RaceOption::sentinel());
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KindSection;
    use crate::model::{RosterKind, User};
    use chrono::{NaiveDate, TimeZone};

    fn race(name: &str, date: NaiveDate) -> Race {
        Race {
            id: 1,
            name: name.into(),
            date,
            external_event_id: None,
            organizers: Vec::new(),
            renters: Vec::new(),
        }
    }

    fn renter(email: &str) -> User {
        User {
            email: email.into(),
            name: format!("Name of {email}"),
        }
    }

    fn config(visibility_days: i64, entry_limit: i64) -> RosterKindConfig {
        RosterKindConfig::from_section(
            RosterKind::Renters,
            &KindSection {
                form_code: "form-rent".into(),
                visibility_days: Some(visibility_days),
                entry_limit: Some(entry_limit),
            },
        )
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, day).unwrap()
    }

    #[test]
    fn past_races_are_never_offered() {
        let races = vec![race("Old Cup", day(1)), race("New Cup", day(3))];
        let options = project_options(&races, &config(6, -1), chrono_tz::UTC, noon());

        assert_eq!(options.len(), 1);
        assert_eq!(options[0].race_name.as_deref(), Some("New Cup"));
    }

    #[test]
    fn visibility_window_hides_distant_races() {
        let races = vec![race("Soon", day(3)), race("Later", day(20))];
        let options = project_options(&races, &config(6, -1), chrono_tz::UTC, noon());

        let names: Vec<_> = options
            .iter()
            .filter_map(|option| option.race_name.as_deref())
            .collect();
        assert_eq!(names, vec!["Soon"]);
    }

    #[test]
    fn no_window_offers_every_future_race() {
        let races = vec![race("Soon", day(3)), race("Later", day(20))];
        let options = project_options(&races, &config(0, -1), chrono_tz::UTC, noon());

        assert_eq!(options.len(), 2);
    }

    #[test]
    fn limited_kinds_show_remaining_slots() {
        let mut entry = race("Spring Cup", day(3));
        entry.renters = vec![renter("a@example.com"), renter("b@example.com")];

        let options = project_options(&[entry], &config(6, 7), chrono_tz::UTC, noon());

        assert_eq!(options[0].label, "Spring Cup - 2026-08-03 (5 Remaining)");
    }

    #[test]
    fn remaining_goes_negative_for_over_capacity_rosters() {
        let mut entry = race("Spring Cup", day(3));
        entry.renters = vec![
            renter("a@example.com"),
            renter("b@example.com"),
            renter("c@example.com"),
        ];

        let options = project_options(&[entry], &config(6, 2), chrono_tz::UTC, noon());

        assert_eq!(options[0].label, "Spring Cup - 2026-08-03 (-1 Remaining)");
    }

    #[test]
    fn unlimited_kinds_show_a_running_count() {
        let mut entry = race("Spring Cup", day(3));
        entry.organizers = vec![renter("a@example.com")];
        let config = RosterKindConfig::from_section(
            RosterKind::Organizers,
            &KindSection {
                form_code: "form-org".into(),
                visibility_days: Some(30),
                entry_limit: Some(-1),
            },
        );

        let options = project_options(&[entry], &config, chrono_tz::UTC, noon());

        assert_eq!(options[0].label, "Spring Cup - 2026-08-03 (1 So Far)");
    }

    #[test]
    fn sentinel_when_nothing_qualifies() {
        let races = vec![race("Old Cup", day(1))];
        let options = project_options(&races, &config(6, -1), chrono_tz::UTC, noon());

        assert_eq!(options.len(), 1);
        assert_eq!(options[0].race_name, None);
        assert_eq!(options[0].label, NO_RACES_SENTINEL);

        let empty = project_options(&[], &config(6, -1), chrono_tz::UTC, noon());
        assert_eq!(empty[0].label, NO_RACES_SENTINEL);
    }

    #[test]
    fn store_order_is_preserved() {
        let races = vec![
            race("Second Listed", day(5)),
            race("First By Date", day(3)),
        ];
        let options = project_options(&races, &config(30, -1), chrono_tz::UTC, noon());

        let names: Vec<_> = options
            .iter()
            .filter_map(|option| option.race_name.as_deref())
            .collect();
        assert_eq!(names, vec!["Second Listed", "First By Date"]);
    }
}
