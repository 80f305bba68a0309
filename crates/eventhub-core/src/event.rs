use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};

use chrono::NaiveDate;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::datetime::{Zone, format_event_time, parse_clock_time, parse_event_date};

/// Opaque backend identifier; the wire may carry it as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    ClubActivity,
    Workshop,
    Seminar,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClubActivity => "CLUB_ACTIVITY",
            Self::Workshop => "WORKSHOP",
            Self::Seminar => "SEMINAR",
            Self::Other(raw) => raw,
        }
    }

    /// Human form: `CLUB_ACTIVITY` becomes `club activity`.
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_lowercase()
    }

    pub fn known() -> [Category; 3] {
        [Self::ClubActivity, Self::Workshop, Self::Seminar]
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace([' ', '-'], "_").to_ascii_uppercase();
        Ok(match normalized.as_str() {
            "CLUB_ACTIVITY" => Self::ClubActivity,
            "WORKSHOP" => Self::Workshop,
            "SEMINAR" => Self::Seminar,
            _ => Self::Other(s.trim().to_string()),
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event exactly as the backend sends it. Everything but the id may be
/// missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub date: Option<String>,

    #[serde(default)]
    pub time: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default, alias = "organizedBy")]
    pub organizer: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, alias = "imageUrl")]
    pub image_path: Option<String>,
}

impl EventRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: EventId::new(id),
            title: None,
            date: None,
            time: None,
            location: None,
            category: None,
            organizer: None,
            description: None,
            image_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event {id}: date {raw:?} is missing or unparseable")]
    InvalidDate { id: EventId, raw: Option<String> },

    #[error("malformed event record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A validated event: the date has been parsed down to a calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub date: NaiveDate,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<Category>,
    pub organizer: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
}

impl Event {
    /// The single conversion from wire record to validated event.
    pub fn from_record(record: EventRecord, zone: Zone) -> Result<Self, EventError> {
        let Some(date) = record
            .date
            .as_deref()
            .and_then(|raw| parse_event_date(raw, zone))
        else {
            return Err(EventError::InvalidDate {
                id: record.id,
                raw: record.date,
            });
        };

        let category = record
            .category
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| raw.parse::<Category>().ok());

        Ok(Self {
            id: record.id,
            title: record.title.unwrap_or_default(),
            date,
            time: record.time,
            location: record.location,
            category,
            organizer: record.organizer,
            description: record.description,
            image_path: record.image_path,
        })
    }

    pub fn from_value(value: Value, zone: Zone) -> Result<Self, EventError> {
        let record: EventRecord = serde_json::from_value(value)?;
        Self::from_record(record, zone)
    }

    pub fn display_time(&self) -> String {
        format_event_time(self.time.as_deref())
    }

    /// `"HH:MM - title"`, or just the title when the time does not render.
    pub fn calendar_label(&self) -> String {
        let time = self.display_time();
        if time.is_empty() {
            self.title.clone()
        } else {
            format!("{time} - {}", self.title)
        }
    }

    pub fn occurs_on(&self, day: NaiveDate) -> bool {
        self.date == day
    }
}

/// The events of one view activation, in backend order. Records that fail
/// conversion are logged and left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventCollection {
    events: Vec<Event>,
    rejected: usize,
}

impl EventCollection {
    #[tracing::instrument(skip(records))]
    pub fn from_records<I>(records: I, zone: Zone) -> Self
    where
        I: IntoIterator<Item = EventRecord>,
    {
        Self::collect(
            records
                .into_iter()
                .map(|record| Event::from_record(record, zone)),
        )
    }

    /// Like [`EventCollection::from_records`], but also tolerates entries
    /// that do not decode as an event record at all.
    #[tracing::instrument(skip(values), fields(count = values.len()))]
    pub fn from_payload(values: Vec<Value>, zone: Zone) -> Self {
        Self::collect(
            values
                .into_iter()
                .map(|value| Event::from_value(value, zone)),
        )
    }

    fn collect<I>(results: I) -> Self
    where
        I: Iterator<Item = Result<Event, EventError>>,
    {
        let mut events = Vec::new();
        let mut rejected = 0;

        for result in results {
            match result {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(error = %err, "skipping event record");
                    rejected += 1;
                }
            }
        }

        debug!(accepted = events.len(), rejected, "event collection built");
        Self { events, rejected }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of records left out because they failed conversion.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

/// A validated create-event form, ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub organizer: String,
    pub date: NaiveDate,
    pub time: String,
    pub location: String,
    pub category: Category,
    pub image: Option<PathBuf>,
}

/// Create-event fields as typed on the command line, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewEventDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub organizer: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub image: Option<PathBuf>,
}

impl NewEventDraft {
    /// Accepts the field name or a short alias (`desc`, `by`, `loc`, `cat`).
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        let slot = match key.to_ascii_lowercase().as_str() {
            "title" => &mut self.title,
            "description" | "desc" => &mut self.description,
            "organizer" | "organizedby" | "by" => &mut self.organizer,
            "date" => &mut self.date,
            "time" => &mut self.time,
            "location" | "loc" => &mut self.location,
            "category" | "cat" => &mut self.category,
            "image" => {
                self.image = (!value.is_empty()).then(|| PathBuf::from(value));
                return Ok(());
            }
            other => bail!("unknown event field: {other}"),
        };
        *slot = (!value.is_empty()).then(|| value.to_string());
        Ok(())
    }

    /// Every field except the image is required.
    pub fn finish(self) -> anyhow::Result<NewEvent> {
        let required = [
            ("title", &self.title),
            ("description", &self.description),
            ("organizer", &self.organizer),
            ("date", &self.date),
            ("time", &self.time),
            ("location", &self.location),
            ("category", &self.category),
        ];
        let missing = required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            bail!("missing required fields: {}", missing.join(", "));
        }

        let raw_date = self.date.unwrap_or_default();
        let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d")
            .with_context(|| format!("date must be YYYY-MM-DD, got {raw_date:?}"))?;

        let raw_time = self.time.unwrap_or_default();
        let time = parse_clock_time(&raw_time)
            .map(|time| time.format("%H:%M").to_string())
            .with_context(|| format!("time must be HH:MM, got {raw_time:?}"))?;

        let category = self
            .category
            .unwrap_or_default()
            .parse::<Category>()
            .unwrap_or_else(|never| match never {});
        if let Category::Other(raw) = &category {
            let known = Category::known().map(|known| known.label()).join(", ");
            bail!("unknown category {raw:?}; expected one of {known}");
        }

        Ok(NewEvent {
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            organizer: self.organizer.unwrap_or_default(),
            date,
            time,
            location: self.location.unwrap_or_default(),
            category,
            image: self.image,
        })
    }
}
