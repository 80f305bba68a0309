use chrono::NaiveDate;
use tracing::trace;

use crate::event::Event;

/// Events occurring on `day`, in collection order.
///
/// Only validated events reach this point; records whose date failed to
/// parse were dropped when the collection was built, so they never match any
/// day.
pub fn events_for_day(events: &[Event], day: NaiveDate) -> Vec<&Event> {
    let matched = events
        .iter()
        .filter(|event| event.occurs_on(day))
        .collect::<Vec<_>>();

    trace!(%day, matched = matched.len(), "aggregated events for day");
    matched
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::events_for_day;
    use crate::datetime::Zone;
    use crate::event::EventCollection;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn sample() -> EventCollection {
        EventCollection::from_payload(
            vec![
                json!({"id": 1, "title": "Robotics", "date": "2024-03-15", "time": "14:00"}),
                json!({"id": 2, "title": "Poetry", "date": "2024-03-15", "time": "bad"}),
                json!({"id": 3, "title": "Chess", "date": "2024-03-16"}),
                json!({"id": 4, "title": "Broken", "date": "15/03/2024"}),
            ],
            Zone::Named(chrono_tz::UTC),
        )
    }

    #[test]
    fn returns_same_day_events_in_source_order() {
        let events = sample();
        let matched = events_for_day(events.events(), day(2024, 3, 15));

        let ids = matched
            .iter()
            .map(|event| event.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(matched[0].display_time(), "14:00");
        assert_eq!(matched[1].display_time(), "");
    }

    #[test]
    fn never_returns_events_from_other_days() {
        let events = sample();
        for offset in 0..40 {
            let target = day(2024, 3, 1) + chrono::Duration::days(offset);
            assert!(
                events_for_day(events.events(), target)
                    .iter()
                    .all(|event| event.date == target)
            );
        }
    }

    #[test]
    fn unparseable_dates_never_match() {
        let events = sample();
        assert_eq!(events.rejected(), 1);

        for _ in 0..2 {
            let hits = (1..=31)
                .flat_map(|d| events_for_day(events.events(), day(2024, 3, d)))
                .filter(|event| event.id.as_str() == "4")
                .count();
            assert_eq!(hits, 0);
        }
    }

    #[test]
    fn time_of_day_does_not_affect_matching() {
        let events = EventCollection::from_payload(
            vec![
                json!({"id": "a", "title": "Morning", "date": "2024-03-15T00:30:00"}),
                json!({"id": "b", "title": "Late", "date": "2024-03-15T23:59:00"}),
            ],
            Zone::Named(chrono_tz::UTC),
        );

        assert_eq!(events_for_day(events.events(), day(2024, 3, 15)).len(), 2);
    }
}
