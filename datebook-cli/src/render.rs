//! TUI rendering traits for datebook types.
//!
//! This module provides extension traits that add colored terminal rendering
//! to datebook-core types using owo_colors.

use datebook_core::notice::{Notice, NoticeKind};
use datebook_core::route::Route;
use datebook_core::settings::{Settings, TimeNotation};
use datebook_core::token::User;
use datebook_core::weather::{WeatherForecast, WeatherType};
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for Notice {
    fn render(&self) -> String {
        match self.kind {
            NoticeKind::Success => format!("{} {}", "✓".green(), self.message),
            NoticeKind::Error => format!("{} {}", "✗".red(), self.message.red()),
            NoticeKind::Warning => format!("{} {}", "!".yellow(), self.message.yellow()),
            NoticeKind::Info => format!("{} {}", "i".blue(), self.message),
        }
    }
}

impl Render for User {
    fn render(&self) -> String {
        format!("{} <{}> {}", self.name.bold(), self.email, format!("({})", self.id).dimmed())
    }
}

impl Render for WeatherType {
    fn render(&self) -> String {
        let label = match self {
            WeatherType::Sunny => "sunny",
            WeatherType::Cloudy => "cloudy",
            WeatherType::Rainy => "rainy",
            WeatherType::Snowy => "snowy",
            WeatherType::Foggy => "foggy",
            WeatherType::Stormy => "stormy",
            WeatherType::Windy => "windy",
            WeatherType::Unknown => "unknown",
        };
        match self {
            WeatherType::Sunny => label.yellow().to_string(),
            WeatherType::Rainy | WeatherType::Stormy => label.blue().to_string(),
            WeatherType::Snowy => label.cyan().to_string(),
            WeatherType::Unknown => label.dimmed().to_string(),
            _ => label.to_string(),
        }
    }
}

impl Render for WeatherForecast {
    fn render(&self) -> String {
        format!(
            "{}  {:>5.1}°C / {:>5.1}°C  {}  {}",
            self.date.format("%a %b %-d").bold(),
            self.min_temp_c,
            self.max_temp_c,
            format!("({:.0}°F / {:.0}°F)", self.min_temp_f, self.max_temp_f).dimmed(),
            self.weather_type.render(),
        )
    }
}

impl Render for Settings {
    fn render(&self) -> String {
        let notation = match self.time_notation {
            TimeNotation::TwelveHour => "12h",
            TimeNotation::TwentyFourHour => "24h",
        };
        let week_start = if self.starts_with_sunday { "Sunday" } else { "Monday" };

        [
            format!("{} {}", "timezone:".dimmed(), self.timezone),
            format!("{} {}", "time notation:".dimmed(), notation),
            format!("{} {}", "week starts on:".dimmed(), week_start),
            format!("{} {}", "focus current hour:".dimmed(), self.focus_hour_on_start),
        ]
        .join("\n")
    }
}

/// What to tell the user to run to get to `route`.
pub fn route_hint(route: Route) -> String {
    match route {
        Route::Auth => format!("Sign in with:\n  {}", "datebook login".bold()),
        Route::SignUp => format!("Create an account with:\n  {}", "datebook signup".bold()),
        Route::Calendar => format!("See your calendar with:\n  {}", "datebook events list".bold()),
    }
}
