use anyhow::Result;
use datebook_core::Datebook;
use datebook_core::settings::{ProfileSettings, TimeNotation};
use owo_colors::OwoColorize;

use super::create_spinner;
use crate::render::Render;

pub fn show(app: &Datebook) -> Result<()> {
    let settings = app.settings.get();
    println!("{}", settings.render());
    println!("{} {}", "days:".dimmed(), settings.day_names().join(" "));
    Ok(())
}

pub fn set(
    app: &Datebook,
    timezone: Option<&str>,
    time_notation: Option<TimeNotation>,
    starts_with_sunday: Option<bool>,
    focus_hour: Option<bool>,
) -> Result<()> {
    if timezone.is_none() && time_notation.is_none() && starts_with_sunday.is_none() && focus_hour.is_none() {
        anyhow::bail!("Nothing to change. See `datebook settings set --help`.");
    }

    if let Some(tz) = timezone {
        app.settings.set_timezone(tz)?;
    }
    if let Some(notation) = time_notation {
        app.settings.set_time_notation(notation)?;
    }
    if let Some(sunday) = starts_with_sunday {
        app.settings.set_starts_with_sunday(sunday)?;
    }
    if let Some(focus) = focus_hour {
        app.settings.set_focus_hour_on_start(focus)?;
    }

    println!("{}", app.settings.get().render());
    Ok(())
}

pub async fn pull(app: &Datebook) -> Result<()> {
    let spinner = create_spinner("Fetching profile...".to_string());
    let result = app.settings.fetch_profile().await;
    spinner.finish_and_clear();

    println!("{}", result?.render());
    Ok(())
}

pub async fn push(app: &Datebook) -> Result<()> {
    let settings = app.settings.get();
    let patch = ProfileSettings {
        timezone: Some(settings.timezone),
        time_notation: Some(settings.time_notation),
        starts_with_sunday: Some(settings.starts_with_sunday),
    };

    let spinner = create_spinner("Updating profile...".to_string());
    let result = app.settings.update_profile(&patch).await;
    spinner.finish_and_clear();
    result?;

    println!("{} Profile updated", "✓".green());
    Ok(())
}
