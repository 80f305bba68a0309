use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RsvpStatus {
    Attending,
    Unavailable,
    Other(String),
}

impl RsvpStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Attending => "attending",
            Self::Unavailable => "unavailable",
            Self::Other(raw) => raw,
        }
    }

    fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "attending" => Self::Attending,
            "unavailable" => Self::Unavailable,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command-line form; only the two statuses a user can submit are accepted.
impl FromStr for RsvpStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_wire(s) {
            Self::Other(raw) => Err(anyhow!(
                "unknown RSVP status {raw:?}; expected attending or unavailable"
            )),
            known => Ok(known),
        }
    }
}

impl Serialize for RsvpStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RsvpStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rsvp {
    pub status: RsvpStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvpCounts {
    pub attending: usize,
    pub unavailable: usize,
    pub other: usize,
}

impl RsvpCounts {
    pub fn tally(rsvps: &[Rsvp]) -> Self {
        rsvps.iter().fold(Self::default(), |mut counts, rsvp| {
            match rsvp.status {
                RsvpStatus::Attending => counts.attending += 1,
                RsvpStatus::Unavailable => counts.unavailable += 1,
                RsvpStatus::Other(_) => counts.other += 1,
            }
            counts
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tally_is_case_insensitive() {
        let rsvps: Vec<Rsvp> = serde_json::from_value(json!([
            {"status": "ATTENDING", "user_id": 4},
            {"status": "attending"},
            {"status": "Unavailable"},
            {"status": "maybe"}
        ]))
        .expect("decode rsvps");

        assert_eq!(
            RsvpCounts::tally(&rsvps),
            RsvpCounts {
                attending: 2,
                unavailable: 1,
                other: 1,
            }
        );
    }

    #[test]
    fn empty_list_counts_zero() {
        assert_eq!(RsvpCounts::tally(&[]), RsvpCounts::default());
    }

    #[test]
    fn command_line_status_rejects_unknown_values() {
        assert_eq!(
            "Attending".parse::<RsvpStatus>().expect("known status"),
            RsvpStatus::Attending
        );
        assert!("maybe".parse::<RsvpStatus>().is_err());
    }

    #[test]
    fn submits_lowercase_status() {
        let body = serde_json::to_value(Rsvp {
            status: RsvpStatus::Unavailable,
        })
        .expect("serialize rsvp");
        assert_eq!(body, json!({"status": "unavailable"}));
    }
}
