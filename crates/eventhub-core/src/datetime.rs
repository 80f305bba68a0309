use std::fmt;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  FixedOffset,
  Local,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};
use chrono_tz::Tz;

use crate::calendar::shift_months;

const TIMEZONE_ENV_VAR: &str =
  "EVENTHUB_TIMEZONE";

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M"
];

/// Time zone in which calendar days
/// are compared.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Zone {
  Local,
  Named(Tz)
}

impl Zone {
  /// Resolves the display zone from the
  /// `timezone` config value, then
  /// `EVENTHUB_TIMEZONE`, then the system
  /// local zone.
  pub fn resolve(
    configured: Option<&str>
  ) -> Self {
    if let Some(raw) = configured
      && let Some(tz) =
        parse_timezone(raw, "config")
    {
      return Self::Named(tz);
    }

    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return Self::Named(tz);
    }

    Self::Local
  }

  #[must_use]
  pub fn date_of(
    &self,
    dt: DateTime<FixedOffset>
  ) -> NaiveDate {
    match self {
      | Self::Local => {
        dt.with_timezone(&Local)
          .date_naive()
      }
      | Self::Named(tz) => {
        dt.with_timezone(tz).date_naive()
      }
    }
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    let now = chrono::Utc::now();
    match self {
      | Self::Local => {
        now.with_timezone(&Local)
          .date_naive()
      }
      | Self::Named(tz) => {
        now.with_timezone(tz).date_naive()
      }
    }
  }
}

impl fmt::Display for Zone {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::Local => f.write_str("local"),
      | Self::Named(tz) => {
        write!(f, "{tz}")
      }
    }
  }
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses the `date` field of an event
/// record down to a calendar day.
///
/// Accepts a plain `YYYY-MM-DD`, an
/// RFC 3339 timestamp (converted into
/// `zone` first) or a naive date-time.
pub fn parse_event_date(
  raw: &str,
  zone: Zone
) -> Option<NaiveDate> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Some(date);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(zone.date_of(dt));
  }

  NAIVE_DATETIME_FORMATS
    .iter()
    .find_map(|format| {
      NaiveDateTime::parse_from_str(
        token, format
      )
      .ok()
    })
    .map(|dt| dt.date())
}

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Renders an event time as `HH:MM`.
///
/// Only the leading integer of the hour
/// and minute parts is read, so `9:30am`
/// is `09:30`. Out-of-range values roll
/// over the clock: `25:00` is `01:00`,
/// `09:75` is `10:15`. Missing input or
/// a part without leading digits yields
/// an empty string.
#[must_use]
pub fn format_event_time(
  time: Option<&str>
) -> String {
  let Some(raw) = time
    .map(str::trim)
    .filter(|raw| !raw.is_empty())
  else {
    return String::new();
  };

  let mut parts = raw.split(':');
  let (Some(hours), Some(minutes)) =
    (parts.next(), parts.next())
  else {
    tracing::debug!(time = %raw, "event time has no minutes part");
    return String::new();
  };

  let total = leading_int(hours)
    .zip(leading_int(minutes))
    .and_then(|(h, m)| {
      h.checked_mul(60)?.checked_add(m)
    })
    .map(|total| {
      total.rem_euclid(MINUTES_PER_DAY)
    });

  match total {
    | Some(total) => {
      format!(
        "{:02}:{:02}",
        total / 60,
        total % 60
      )
    }
    | None => {
      tracing::debug!(time = %raw, "event time has no numeric parts");
      String::new()
    }
  }
}

/// The integer at the start of `raw`:
/// leading whitespace, an optional
/// sign, then digits. Anything after the
/// digits is ignored.
fn leading_int(raw: &str) -> Option<i64> {
  let trimmed = raw.trim_start();
  let (negative, rest) =
    match trimmed.strip_prefix('-') {
      | Some(rest) => (true, rest),
      | None => {
        (
          false,
          trimmed
            .strip_prefix('+')
            .unwrap_or(trimmed)
        )
      }
    };
  let end = rest
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(rest.len());
  let value =
    rest[..end].parse::<i64>().ok()?;
  Some(if negative { -value } else { value })
}

/// Strict `H:MM` / `HH:MM[:SS]` parse
/// for times typed into the create form.
/// Every part must be one or two digits
/// and within the clock's range.
#[must_use]
pub fn parse_clock_time(
  raw: &str
) -> Option<NaiveTime> {
  let parts = raw
    .trim()
    .split(':')
    .collect::<Vec<_>>();
  if !(2..=3).contains(&parts.len())
    || parts.iter().any(|part| {
      part.is_empty()
        || part.len() > 2
        || !part
          .bytes()
          .all(|b| b.is_ascii_digit())
    })
  {
    return None;
  }

  let hour = parts[0].parse().ok()?;
  let minute = parts[1].parse().ok()?;
  let second = match parts.get(2) {
    | Some(part) => part.parse().ok()?,
    | None => 0
  };
  NaiveTime::from_hms_opt(
    hour, minute, second
  )
}

/// Resolves the month argument of the
/// `calendar` command into a reference
/// date.
///
/// `YYYY-MM`, `YYYY-MM-DD`, `today`, and
/// relative `+N` / `-N` month offsets
/// from `today` are understood.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_month_arg(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  if matches!(
    lower.as_str(),
    "" | "today" | "now"
  ) {
    return Ok(today);
  }

  if let Some(rest) = token
    .strip_prefix('+')
    .or_else(|| {
      token
        .starts_with('-')
        .then_some(token)
    })
  {
    let offset: i32 =
      rest.parse().with_context(|| {
        format!(
          "invalid month offset: \
           {token}"
        )
      })?;
    return Ok(shift_months(
      today, offset
    ));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  let (year, month) = token
    .split_once('-')
    .ok_or_else(|| {
      anyhow!(
        "expected YYYY-MM, YYYY-MM-DD, \
         +N or -N, got: {token}"
      )
    })?;
  let year: i32 =
    year.parse().with_context(|| {
      format!("invalid year in {token}")
    })?;
  let month: u32 =
    month.parse().with_context(|| {
      format!(
        "invalid month in {token}"
      )
    })?;
  if !(1..=12).contains(&month) {
    return Err(anyhow!(
      "month out of range in {token}"
    ));
  }

  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .ok_or_else(|| {
    anyhow!(
      "invalid calendar month: {token}"
    )
  })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    Zone,
    format_event_time,
    parse_clock_time,
    parse_event_date,
    parse_month_arg
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn formats_canonical_times() {
    assert_eq!(
      format_event_time(Some("09:30")),
      "09:30"
    );
    assert_eq!(
      format_event_time(Some("9:5")),
      "09:05"
    );
    assert_eq!(
      format_event_time(Some(
        "14:00:00"
      )),
      "14:00"
    );
  }

  #[test]
  fn out_of_range_times_roll_over() {
    assert_eq!(
      format_event_time(Some("25:00")),
      "01:00"
    );
    assert_eq!(
      format_event_time(Some("09:75")),
      "10:15"
    );
    assert_eq!(
      format_event_time(Some("-1:00")),
      "23:00"
    );
  }

  #[test]
  fn trailing_text_after_digits_is_ignored()
  {
    assert_eq!(
      format_event_time(Some("9:30am")),
      "09:30"
    );
    assert_eq!(
      format_event_time(Some(
        " 18 : 05 pm"
      )),
      "18:05"
    );
  }

  #[test]
  fn malformed_times_render_empty() {
    assert_eq!(
      format_event_time(None),
      ""
    );
    assert_eq!(
      format_event_time(Some("")),
      ""
    );
    assert_eq!(
      format_event_time(Some("bad")),
      ""
    );
    assert_eq!(
      format_event_time(Some("ab:cd")),
      ""
    );
    assert_eq!(
      format_event_time(Some("10:xx")),
      ""
    );
  }

  #[test]
  fn clock_times_are_strict() {
    assert_eq!(
      parse_clock_time("9:5").map(|t| {
        t.format("%H:%M").to_string()
      }),
      Some("09:05".to_string())
    );
    assert!(
      parse_clock_time("14:00:30")
        .is_some()
    );
    assert_eq!(
      parse_clock_time("25:00"),
      None
    );
    assert_eq!(
      parse_clock_time("09:75"),
      None
    );
    assert_eq!(
      parse_clock_time("9:30am"),
      None
    );
    assert_eq!(
      parse_clock_time("930"),
      None
    );
  }

  #[test]
  fn parses_plain_and_timestamp_dates() {
    let utc = Zone::Named(chrono_tz::UTC);
    assert_eq!(
      parse_event_date(
        "2024-03-15",
        utc
      ),
      Some(day(2024, 3, 15))
    );
    assert_eq!(
      parse_event_date(
        "2024-03-15T10:00:00",
        utc
      ),
      Some(day(2024, 3, 15))
    );
    assert_eq!(
      parse_event_date(
        "2024-03-15 18:45",
        utc
      ),
      Some(day(2024, 3, 15))
    );
    assert_eq!(
      parse_event_date("not a date", utc),
      None
    );
    assert_eq!(
      parse_event_date("", utc),
      None
    );
  }

  #[test]
  fn timestamps_use_the_display_zone() {
    let accra = Zone::Named(
      chrono_tz::Africa::Accra
    );
    let new_york = Zone::Named(
      chrono_tz::America::New_York
    );
    let raw = "2024-03-15T02:00:00Z";

    assert_eq!(
      parse_event_date(raw, accra),
      Some(day(2024, 3, 15))
    );
    assert_eq!(
      parse_event_date(raw, new_york),
      Some(day(2024, 3, 14))
    );
  }

  #[test]
  fn month_args_resolve_against_today() {
    let today = day(2024, 1, 31);

    assert_eq!(
      parse_month_arg("+1", today)
        .expect("next month"),
      day(2024, 2, 29)
    );
    assert_eq!(
      parse_month_arg("-2", today)
        .expect("two months back"),
      day(2023, 11, 30)
    );
    assert_eq!(
      parse_month_arg("2024-03", today)
        .expect("explicit month"),
      day(2024, 3, 1)
    );
    assert_eq!(
      parse_month_arg("today", today)
        .expect("today"),
      today
    );
    assert!(
      parse_month_arg("2024-13", today)
        .is_err()
    );
    assert!(
      parse_month_arg("march", today)
        .is_err()
    );
  }
}
