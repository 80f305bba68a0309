use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::calendar::{CalendarCell, WEEKDAY_LABELS, month_title};
use crate::config::Config;
use crate::datetime::{Zone, format_event_time, parse_event_date};
use crate::event::{Category, Event, EventRecord};
use crate::rsvp::RsvpCounts;
use crate::session::User;

const CELL_WIDTH: usize = 16;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Seven columns, Sunday first. Each week prints the day numbers, then
    /// one line per event slot; a short final week stays short.
    #[tracing::instrument(skip(self, out, cells))]
    pub fn write_month<W: Write>(
        &self,
        mut out: W,
        reference: NaiveDate,
        today: NaiveDate,
        cells: &[CalendarCell<'_>],
    ) -> anyhow::Result<()> {
        let title = month_title(reference);
        let grid_width = (CELL_WIDTH + 1) * WEEKDAY_LABELS.len();
        let indent = grid_width.saturating_sub(title.width()) / 2;
        writeln!(out, "{}{}", " ".repeat(indent), self.paint(&title, "1"))?;

        for label in WEEKDAY_LABELS {
            write!(out, "{} ", pad(&self.paint(label, "4"), CELL_WIDTH))?;
        }
        writeln!(out)?;

        for week in cells.chunks(WEEKDAY_LABELS.len()) {
            let slots = week
                .iter()
                .map(|cell| match cell {
                    CalendarCell::Day { events, .. } => events.len(),
                    CalendarCell::Blank => 0,
                })
                .max()
                .unwrap_or(0);

            let days = week
                .iter()
                .map(|cell| match cell.date() {
                    Some(date) if date == today => self.paint(&day_number(date), "7"),
                    Some(date) => day_number(date),
                    None => String::new(),
                })
                .collect::<Vec<_>>();
            write_grid_line(&mut out, &days)?;

            for slot in 0..slots {
                let labels = week
                    .iter()
                    .map(|cell| match cell {
                        CalendarCell::Day { events, .. } => events
                            .get(slot)
                            .map(|event| self.paint(&truncate(&event.calendar_label(), CELL_WIDTH), "36"))
                            .unwrap_or_default(),
                        CalendarCell::Blank => String::new(),
                    })
                    .collect::<Vec<_>>();
                write_grid_line(&mut out, &labels)?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, out, events))]
    pub fn write_event_table<W: Write>(&self, out: W, events: &[&Event]) -> anyhow::Result<()> {
        let headers = ["ID", "Date", "Time", "Location", "Category", "Title"]
            .map(str::to_string)
            .to_vec();

        let rows = events
            .iter()
            .map(|event| {
                vec![
                    self.paint(event.id.as_str(), "33"),
                    event.date.format("%Y-%m-%d").to_string(),
                    event.display_time(),
                    event.location.clone().unwrap_or_default(),
                    event
                        .category
                        .as_ref()
                        .map(|category| category.label())
                        .unwrap_or_default(),
                    event.title.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    /// Details straight from the backend record, so an event with a missing
    /// or unreadable date still shows; absent values print as `N/A`.
    #[tracing::instrument(skip(self, out, record, counts), fields(id = %record.id))]
    pub fn write_event_info<W: Write>(
        &self,
        mut out: W,
        record: &EventRecord,
        zone: Zone,
        counts: Option<RsvpCounts>,
    ) -> anyhow::Result<()> {
        let date = record
            .date
            .as_deref()
            .and_then(|raw| parse_event_date(raw, zone))
            .map(|date| date.format("%A, %B %-d %Y").to_string());
        let time = Some(format_event_time(record.time.as_deref())).filter(|time| !time.is_empty());
        let category = record
            .category
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| raw.parse::<Category>().unwrap_or_else(|never| match never {}).label());

        writeln!(out, "id          {}", self.paint(record.id.as_str(), "33"))?;
        writeln!(out, "title       {}", or_na(record.title.as_deref()))?;
        writeln!(out, "date        {}", or_na(date.as_deref()))?;
        writeln!(out, "time        {}", or_na(time.as_deref()))?;
        writeln!(out, "location    {}", or_na(record.location.as_deref()))?;
        writeln!(out, "category    {}", or_na(category.as_deref()))?;
        writeln!(out, "organizer   {}", or_na(record.organizer.as_deref()))?;
        if let Some(image) = record.image_path.as_deref().filter(|path| !path.is_empty()) {
            writeln!(out, "image       {image}")?;
        }
        if let Some(description) = record.description.as_deref().filter(|text| !text.is_empty()) {
            writeln!(out)?;
            writeln!(out, "{description}")?;
        }

        match counts {
            Some(counts) => {
                writeln!(out)?;
                writeln!(out, "attending   {}", self.paint(&counts.attending.to_string(), "32"))?;
                writeln!(out, "unavailable {}", self.paint(&counts.unavailable.to_string(), "31"))?;
                if counts.other > 0 {
                    writeln!(out, "other       {}", counts.other)?;
                }
            }
            None => {
                writeln!(out)?;
                writeln!(out, "rsvps       unavailable")?;
            }
        }

        Ok(())
    }

    pub fn write_user<W: Write>(&self, mut out: W, user: &User) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} <{}> ({})",
            user.display_name(),
            user.email,
            self.paint(user.role.as_str(), "33")
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|value| !value.is_empty()).unwrap_or("N/A")
}

fn day_number(date: NaiveDate) -> String {
    date.format("%-d").to_string()
}

fn write_grid_line<W: Write>(out: &mut W, cells: &[String]) -> anyhow::Result<()> {
    let line = cells
        .iter()
        .map(|cell| pad(cell, CELL_WIDTH))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "{}", line.trim_end())?;
    Ok(())
}

/// Right-pads by visible width, ignoring ANSI escapes.
fn pad(cell: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    format!("{cell}{}", " ".repeat(width.saturating_sub(visible)))
}

/// Cuts `text` to at most `width` columns, marking the cut with `~`.
fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width + 1 > width {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out.push('~');
    out
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            write!(writer, "{} ", pad(&row[idx], widths[idx]))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
