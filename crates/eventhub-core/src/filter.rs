use tracing::trace;

use crate::event::{
  Category,
  Event
};

/// Narrowing applied to the event list:
/// free-text search over title and
/// location plus an exact category.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
  search:   Option<String>,
  category: Option<Category>
}

impl EventFilter {
  pub fn new(
    search: Option<String>,
    category: Option<Category>
  ) -> Self {
    let search = search
      .map(|text| {
        text.trim().to_lowercase()
      })
      .filter(|text| !text.is_empty());
    Self {
      search,
      category
    }
  }

  /// Builds a filter from command terms.
  /// `category:NAME` (or `cat:NAME`)
  /// selects a category; every other
  /// term joins the search text.
  #[tracing::instrument(skip(terms))]
  pub fn parse(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut words = Vec::new();
    let mut category = None;

    for term in terms {
      let selector = term
        .split_once(':')
        .or_else(|| term.split_once('='))
        .filter(|(key, _)| {
          matches!(
            key
              .to_ascii_lowercase()
              .as_str(),
            "category" | "cat"
          )
        });

      if let Some((_, value)) = selector {
        if value.trim().is_empty() {
          anyhow::bail!(
            "category filter needs a \
             value: {term}"
          );
        }
        let parsed = value
          .parse::<Category>()
          .unwrap_or_else(|never| {
            match never {}
          });
        trace!(category = %parsed, "category filter");
        category = Some(parsed);
        continue;
      }

      words.push(term.as_str());
    }

    let search = (!words.is_empty())
      .then(|| words.join(" "));
    Ok(Self::new(search, category))
  }

  pub fn category(
    &self
  ) -> Option<&Category> {
    self.category.as_ref()
  }

  pub fn matches(
    &self,
    event: &Event
  ) -> bool {
    let matches_search =
      match &self.search {
        | None => true,
        | Some(needle) => {
          event
            .title
            .to_lowercase()
            .contains(needle)
            || event
              .location
              .as_deref()
              .unwrap_or_default()
              .to_lowercase()
              .contains(needle)
        }
      };

    let matches_category =
      match &self.category {
        | None => true,
        | Some(wanted) => {
          event.category.as_ref()
            == Some(wanted)
        }
      };

    matches_search && matches_category
  }

  pub fn apply<'a>(
    &self,
    events: &'a [Event]
  ) -> Vec<&'a Event> {
    events
      .iter()
      .filter(|event| self.matches(event))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::EventFilter;
  use crate::datetime::Zone;
  use crate::event::{
    Category,
    EventCollection
  };

  fn sample() -> EventCollection {
    EventCollection::from_payload(
      vec![
        json!({
          "id": 1,
          "title": "Intro to Rust",
          "date": "2024-03-15",
          "location": "Lab 2",
          "category": "WORKSHOP"
        }),
        json!({
          "id": 2,
          "title": "Debate night",
          "date": "2024-03-16",
          "location": "Rust Hall",
          "category": "CLUB_ACTIVITY"
        }),
        json!({
          "id": 3,
          "title": "Ethics seminar",
          "date": "2024-03-17",
          "category": "SEMINAR"
        }),
      ],
      Zone::Named(chrono_tz::UTC)
    )
  }

  fn ids(
    filter: &EventFilter,
    events: &EventCollection
  ) -> Vec<String> {
    filter
      .apply(events.events())
      .iter()
      .map(|event| event.id.to_string())
      .collect()
  }

  #[test]
  fn empty_filter_keeps_everything() {
    let events = sample();
    let filter = EventFilter::parse(&[])
      .expect("parse empty");
    assert_eq!(
      ids(&filter, &events),
      vec!["1", "2", "3"]
    );
  }

  #[test]
  fn search_covers_title_and_location_case_insensitively()
   {
    let events = sample();
    let filter = EventFilter::parse(&[
      "RUST".to_string(),
    ])
    .expect("parse search");
    assert_eq!(
      ids(&filter, &events),
      vec!["1", "2"]
    );
  }

  #[test]
  fn category_and_search_combine() {
    let events = sample();
    let filter = EventFilter::parse(&[
      "rust".to_string(),
      "category:WORKSHOP".to_string(),
    ])
    .expect("parse combined");
    assert_eq!(
      filter.category(),
      Some(&Category::Workshop)
    );
    assert_eq!(
      ids(&filter, &events),
      vec!["1"]
    );
  }

  #[test]
  fn empty_category_value_is_an_error() {
    assert!(
      EventFilter::parse(&[
        "category:".to_string()
      ])
      .is_err()
    );
  }
}
