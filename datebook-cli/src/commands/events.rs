use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use datebook_core::Datebook;
use datebook_core::events::{EventDraft, TimeEvent};
use datebook_core::settings::Settings;
use owo_colors::OwoColorize;

use super::create_spinner;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

/// Fields to change on an existing event. `None` keeps the current value.
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

pub async fn list(app: &Datebook, month: Option<&str>) -> Result<()> {
    let settings = app.settings.get();
    let range = month_range(&settings, month)?;

    let spinner = create_spinner("Fetching events...".to_string());
    let result = app.events.fetch_events(range).await;
    spinner.finish_and_clear();
    let events = result?;

    if app.events.is_stale() {
        println!("{}", "Showing the last events fetched, the backend couldn't be reached.".yellow());
    }
    if events.is_empty() {
        println!("{}", "No events".dimmed());
        return Ok(());
    }

    for (day, day_events) in group_by_day(&settings, &events)? {
        println!("{}", day.format("%A, %B %-d").bold());
        for event in day_events {
            println!(
                "  {} {}  {}",
                settings.format_time(event.start)?,
                format!("→ {}", settings.format_time(event.end)?).dimmed(),
                event.title
            );
            println!("    {}", event.id.dimmed());
        }
        println!();
    }

    Ok(())
}

pub async fn new(
    app: &Datebook,
    title: String,
    description: String,
    start: &str,
    end: Option<&str>,
    duration: &str,
) -> Result<()> {
    let settings = app.settings.get();
    let start = parse_datetime(&settings, start)?;
    let end = match end {
        Some(e) => parse_datetime(&settings, e)?,
        None => apply_duration(start, duration)?,
    };
    if end <= start {
        anyhow::bail!("The event has to end after it starts.");
    }

    let draft = EventDraft {
        title,
        description,
        start,
        end,
    };

    let spinner = create_spinner("Creating event...".to_string());
    let result = app.events.create_event(&draft).await;
    spinner.finish_and_clear();
    result?;

    println!("{}", format!("  Created: {}", draft.title).green());
    Ok(())
}

pub async fn edit(app: &Datebook, id: &str, month: Option<&str>, changes: EventChanges) -> Result<()> {
    let settings = app.settings.get();
    let range = month_range(&settings, month)?;

    let spinner = create_spinner("Fetching events...".to_string());
    let result = app.events.fetch_events(range).await;
    spinner.finish_and_clear();
    let events = result?;

    let mut event = find_event(events, id, month, app.events.is_stale())?;

    if let Some(title) = changes.title {
        event.title = title;
    }
    if let Some(description) = changes.description {
        event.description = description;
    }
    if let Some(start) = changes.start {
        // Moving the start keeps the length unless a new end is given
        let length = event.end - event.start;
        event.start = parse_datetime(&settings, &start)?;
        event.end = event.start + length;
    }
    if let Some(end) = changes.end {
        event.end = parse_datetime(&settings, &end)?;
    }
    if event.end <= event.start {
        anyhow::bail!("The event has to end after it starts.");
    }

    let spinner = create_spinner("Saving event...".to_string());
    let result = app.events.modify_event(&event).await;
    spinner.finish_and_clear();
    result?;

    println!("{}", format!("  Updated: {}", event.title).green());
    Ok(())
}

pub async fn delete(app: &Datebook, id: &str) -> Result<()> {
    let spinner = create_spinner("Deleting event...".to_string());
    let result = app.events.delete_event(id).await;
    spinner.finish_and_clear();
    result?;

    println!("{}", format!("  Deleted: {}", id).green());
    Ok(())
}

/// Look `id` up among the fetched events. `stale` means the fetch failed and
/// `events` is only what was known before.
fn find_event(events: Vec<TimeEvent>, id: &str, month: Option<&str>, stale: bool) -> Result<TimeEvent> {
    if let Some(event) = events.into_iter().find(|e| e.id == id) {
        return Ok(event);
    }

    if stale {
        anyhow::bail!("Couldn't fetch events to look up '{}'. Try again once the backend is reachable.", id);
    }
    match month {
        Some(m) => anyhow::bail!("Event '{}' not found in {}.", id, m),
        None => anyhow::bail!(
            "Event '{}' not found in the current month. Pass --month YYYY-MM to look elsewhere.",
            id
        ),
    }
}

fn month_range(settings: &Settings, month: Option<&str>) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    match month {
        Some(m) => {
            let (year, month) = parse_month(m)?;
            Ok(Some(settings.month_range(year, month)?))
        }
        None => Ok(None),
    }
}

/// Parse "YYYY-MM" into a year and month.
fn parse_month(input: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{input}-01"), "%Y-%m-%d")
        .with_context(|| format!("Could not parse month: \"{}\" (expected YYYY-MM)", input))?;
    Ok((date.year(), date.month()))
}

/// Parse a wall-clock date/time in the configured timezone.
fn parse_datetime(settings: &Settings, input: &str) -> Result<DateTime<Utc>> {
    let local = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input.trim(), fmt).ok())
        .ok_or_else(|| {
            anyhow::anyhow!("Could not parse date/time: \"{}\" (expected YYYY-MM-DDTHH:MM)", input)
        })?;
    Ok(settings.to_utc(local)?)
}

fn apply_duration(start: DateTime<Utc>, input: &str) -> Result<DateTime<Utc>> {
    let std_dur = humantime::parse_duration(input)
        .with_context(|| format!("Could not parse duration: \"{}\"", input))?;
    let chrono_dur = Duration::from_std(std_dur).context("Duration too large")?;
    Ok(start + chrono_dur)
}

/// Events keyed by the local day they start on, each day in start order.
fn group_by_day<'a>(
    settings: &Settings,
    events: &'a [TimeEvent],
) -> Result<BTreeMap<NaiveDate, Vec<&'a TimeEvent>>> {
    let tz = settings.tz()?;
    let mut days: BTreeMap<NaiveDate, Vec<&TimeEvent>> = BTreeMap::new();

    for event in events {
        let day = event.start.with_timezone(&tz).date_naive();
        days.entry(day).or_default().push(event);
    }
    for day_events in days.values_mut() {
        day_events.sort_by_key(|e| e.start);
    }

    Ok(days)
}
