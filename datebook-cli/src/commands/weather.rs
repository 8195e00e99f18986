use anyhow::Result;
use datebook_core::Datebook;
use owo_colors::OwoColorize;

use super::create_spinner;
use crate::render::Render;

pub async fn run(app: &Datebook, city: &str, days: u32) -> Result<()> {
    let spinner = create_spinner(format!("Fetching weather for {}...", city));
    let forecast = app.weather.fetch_weather(city, days).await;
    spinner.finish_and_clear();

    if forecast.is_empty() {
        println!("{}", "No forecast available".dimmed());
        return Ok(());
    }

    println!("{}", city.bold());
    for day in &forecast {
        println!("  {}", day.render());
    }

    Ok(())
}
