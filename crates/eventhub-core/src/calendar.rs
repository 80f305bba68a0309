use chrono::{
  Datelike,
  NaiveDate
};

use crate::aggregate::events_for_day;
use crate::event::{
  Event,
  EventCollection
};

/// Column headers of the month view,
/// Sunday first.
pub const WEEKDAY_LABELS: [&str; 7] = [
  "Sun", "Mon", "Tue", "Wed", "Thu",
  "Fri", "Sat"
];

/// One grid position of a month view
/// before events are attached.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum MonthCell {
  Blank,
  Day(NaiveDate)
}

/// One grid position of a month view,
/// ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum CalendarCell<'a> {
  Blank,
  Day {
    date:   NaiveDate,
    events: Vec<&'a Event>
  }
}

impl CalendarCell<'_> {
  pub fn date(&self) -> Option<NaiveDate> {
    match self {
      | Self::Blank => None,
      | Self::Day {
        date, ..
      } => Some(*date)
    }
  }
}

pub fn first_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

pub fn last_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  let (next_year, next_month) =
    if date.month() >= 12 {
      (date.year().saturating_add(1), 1_u32)
    } else {
      (date.year(), date.month() + 1)
    };
  NaiveDate::from_ymd_opt(
    next_year, next_month, 1
  )
  .and_then(|next| next.pred_opt())
  .unwrap_or(date)
}

pub fn days_in_month(
  date: NaiveDate
) -> u32 {
  last_day_of_month(date).day()
}

/// Day-of-week of the first of the
/// month, 0 = Sunday .. 6 = Saturday.
pub fn first_weekday_index(
  date: NaiveDate
) -> u32 {
  first_day_of_month(date)
    .weekday()
    .num_days_from_sunday()
}

/// Lays out the month containing
/// `reference`: leading blanks so the
/// first lands in its weekday column,
/// then every day of the month in order.
///
/// The final week is not padded with
/// trailing blanks.
#[tracing::instrument]
pub fn month_cells(
  reference: NaiveDate
) -> Vec<MonthCell> {
  let first =
    first_day_of_month(reference);
  let last =
    last_day_of_month(reference);
  let blanks =
    first_weekday_index(reference)
      as usize;

  let mut cells = Vec::with_capacity(
    blanks + days_in_month(reference) as usize
  );
  cells.extend(
    std::iter::repeat_n(
      MonthCell::Blank,
      blanks
    )
  );
  cells.extend(
    first
      .iter_days()
      .take_while(|day| *day <= last)
      .map(MonthCell::Day)
  );

  tracing::trace!(
    blanks,
    total = cells.len(),
    "month cells built"
  );
  cells
}

/// Builds the month grid for `reference`
/// and fills every day cell with the
/// events occurring on it.
#[tracing::instrument(skip(events), fields(events = events.len()))]
pub fn build_month_view(
  reference: NaiveDate,
  events: &EventCollection
) -> Vec<CalendarCell<'_>> {
  month_cells(reference)
    .into_iter()
    .map(|cell| match cell {
      | MonthCell::Blank => {
        CalendarCell::Blank
      }
      | MonthCell::Day(date) => {
        CalendarCell::Day {
          date,
          events: events_for_day(
            events.events(),
            date
          )
        }
      }
    })
    .collect()
}

/// Moves `date` by `months`, clamping
/// the day to the length of the target
/// month.
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let total = date.year() * 12
    + date.month0() as i32
    + months;
  let year = total.div_euclid(12);
  let month =
    total.rem_euclid(12) as u32 + 1;

  let Some(first) =
    NaiveDate::from_ymd_opt(year, month, 1)
  else {
    return date;
  };
  let day =
    date.day().min(days_in_month(first));
  first
    .with_day(day)
    .unwrap_or(first)
}

pub fn month_title(
  date: NaiveDate
) -> String {
  date.format("%B %Y").to_string()
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate
  };

  use super::*;
  use crate::datetime::Zone;
  use crate::event::EventRecord;

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn record(
    id: &str,
    date: &str
  ) -> EventRecord {
    EventRecord {
      date: Some(date.to_string()),
      title: Some(format!("event {id}")),
      ..EventRecord::new(id)
    }
  }

  #[test]
  fn march_2024_starts_on_friday() {
    let cells =
      month_cells(day(2024, 3, 1));

    let blanks = cells
      .iter()
      .take_while(|cell| {
        **cell == MonthCell::Blank
      })
      .count();
    assert_eq!(blanks, 5);
    assert_eq!(cells.len(), 5 + 31);
    assert_eq!(
      cells[5],
      MonthCell::Day(day(2024, 3, 1))
    );
    assert_eq!(
      cells.last(),
      Some(&MonthCell::Day(day(
        2024, 3, 31
      )))
    );
  }

  #[test]
  fn grid_matches_weekday_and_length_for_every_month()
   {
    for year in [1999, 2000, 2023, 2024, 2100]
    {
      for month in 1..=12 {
        let reference =
          day(year, month, 15);
        let cells =
          month_cells(reference);
        let expected_blanks =
          first_weekday_index(reference)
            as usize;

        assert!(
          cells[..expected_blanks]
            .iter()
            .all(|cell| {
              *cell == MonthCell::Blank
            })
        );

        let days = cells
          [expected_blanks..]
          .iter()
          .map(|cell| match cell {
            | MonthCell::Day(date) => {
              *date
            }
            | MonthCell::Blank => {
              panic!(
                "blank after first day"
              )
            }
          })
          .collect::<Vec<_>>();

        assert_eq!(
          days.len() as u32,
          days_in_month(reference)
        );
        assert!(
          days
            .windows(2)
            .all(|pair| pair[0] < pair[1])
        );
        assert!(days.iter().all(|date| {
          date.month() == month
            && date.year() == year
        }));
      }
    }
  }

  #[test]
  fn february_lengths_follow_leap_years() {
    assert_eq!(
      days_in_month(day(2024, 2, 10)),
      29
    );
    assert_eq!(
      days_in_month(day(2023, 2, 10)),
      28
    );
    assert_eq!(
      days_in_month(day(1900, 2, 1)),
      28
    );
    assert_eq!(
      days_in_month(day(2000, 2, 1)),
      29
    );
  }

  #[test]
  fn month_starting_on_sunday_has_no_blanks()
  {
    let cells =
      month_cells(day(2024, 9, 30));
    assert_eq!(
      cells.first(),
      Some(&MonthCell::Day(day(
        2024, 9, 1
      )))
    );
    assert_eq!(cells.len(), 30);
  }

  #[test]
  fn shift_months_clamps_day() {
    assert_eq!(
      shift_months(day(2024, 1, 31), 1),
      day(2024, 2, 29)
    );
    assert_eq!(
      shift_months(day(2024, 3, 31), -1),
      day(2024, 2, 29)
    );
    assert_eq!(
      shift_months(day(2024, 12, 15), 1),
      day(2025, 1, 15)
    );
    assert_eq!(
      shift_months(day(2024, 1, 15), -13),
      day(2022, 12, 15)
    );
  }

  #[test]
  fn month_view_attaches_events_per_day() {
    let events =
      EventCollection::from_records(
        vec![
          record("1", "2024-03-15"),
          record("2", "2024-03-15"),
          record("3", "2024-03-16"),
          record("4", "2024-04-01"),
        ],
        Zone::Named(chrono_tz::UTC)
      );

    let cells = build_month_view(
      day(2024, 3, 10),
      &events
    );
    let fifteenth = cells
      .iter()
      .find(|cell| {
        cell.date() == Some(day(2024, 3, 15))
      })
      .expect("15th present");
    let CalendarCell::Day {
      events: on_day,
      ..
    } = fifteenth
    else {
      panic!("expected day cell");
    };
    let ids = on_day
      .iter()
      .map(|event| event.id.as_str())
      .collect::<Vec<_>>();
    assert_eq!(ids, vec!["1", "2"]);

    let attached: usize = cells
      .iter()
      .map(|cell| match cell {
        | CalendarCell::Day {
          events, ..
        } => events.len(),
        | CalendarCell::Blank => 0
      })
      .sum();
    assert_eq!(attached, 3);
  }

  #[test]
  fn empty_collection_still_renders_month() {
    let events = EventCollection::default();
    let cells = build_month_view(
      day(2024, 3, 1),
      &events
    );
    assert_eq!(cells.len(), 36);
    assert_eq!(month_title(day(2024, 3, 1)), "March 2024");
  }
}
