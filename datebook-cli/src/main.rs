mod commands;
mod render;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use datebook_core::Datebook;
use datebook_core::config::DatebookConfig;
use datebook_core::route::Route;
use datebook_core::settings::TimeNotation;
use tracing_subscriber::EnvFilter;

use crate::render::{Render, route_hint};

#[derive(Parser)]
#[command(name = "datebook")]
#[command(about = "Sign in to datebook, browse and edit your calendar, check the weather")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Signup {
        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        name: Option<String>,
    },
    /// Sign out and forget the stored tokens
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Check whether an email address is free to sign up with
    CheckEmail { email: String },
    /// Exchange the refresh token for a new access token now
    Refresh,
    ChangePassword,
    /// Permanently delete the signed-in account
    DeleteAccount,
    /// Keep the session fresh in the foreground until interrupted
    Watch,
    Events {
        #[command(subcommand)]
        command: EventCommands,
    },
    /// Show the forecast for a city
    Weather {
        city: String,

        /// Number of days to fetch
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Sync preferences with the account profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show or change the client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    Show,
    Set {
        /// Backend base URL (e.g., "https://api.example.com")
        #[arg(long)]
        api_url: Option<String>,

        /// Where tokens, settings and caches are kept
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// How often `datebook watch` renews the access token (e.g., "45m")
        #[arg(long)]
        refresh_interval: Option<String>,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    /// List events for a month (defaults to the current one)
    List {
        /// Month to show (YYYY-MM)
        #[arg(short, long)]
        month: Option<String>,
    },
    New {
        title: String,

        /// Start date/time (e.g., "2025-03-20T15:00")
        #[arg(short, long)]
        start: String,

        /// End date/time, defaults to start + duration
        #[arg(short, long)]
        end: Option<String>,

        /// Length of the event (e.g., "45m", "2h")
        #[arg(short, long, default_value = "1h")]
        duration: String,

        #[arg(long, default_value = "")]
        description: String,
    },
    Edit {
        id: String,

        /// Month the event is in (YYYY-MM), defaults to the current one
        #[arg(short, long)]
        month: Option<String>,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        start: Option<String>,

        #[arg(short, long)]
        end: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show,
    Set {
        /// IANA timezone name (e.g., "Europe/Paris")
        #[arg(long)]
        timezone: Option<String>,

        #[arg(long)]
        time_notation: Option<NotationArg>,

        #[arg(long)]
        week_start: Option<WeekStartArg>,

        /// Scroll the day view to the current hour on open
        #[arg(long)]
        focus_hour: Option<bool>,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Replace local preferences with the ones stored on the account
    Pull,
    /// Upload local preferences to the account
    Push,
}

#[derive(Clone, Copy, ValueEnum)]
enum NotationArg {
    #[value(name = "12")]
    Twelve,
    #[value(name = "24")]
    TwentyFour,
}

impl From<NotationArg> for TimeNotation {
    fn from(arg: NotationArg) -> Self {
        match arg {
            NotationArg::Twelve => TimeNotation::TwelveHour,
            NotationArg::TwentyFour => TimeNotation::TwentyFourHour,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WeekStartArg {
    Sunday,
    Monday,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Configuration is handled before the client opens its storage
    let command = match cli.command {
        Commands::Config { command } => return run_config(command),
        command => command,
    };

    let config = DatebookConfig::load()?;
    let app = Datebook::open(config)?;

    let result = run(&app, command).await;

    for notice in app.notices.drain() {
        eprintln!("{}", notice.render());
    }

    result
}

async fn run(app: &Datebook, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email } => commands::auth::login(app, email).await,
        Commands::Signup { email, name } => commands::auth::signup(app, email, name).await,
        Commands::Logout => commands::auth::logout(app),
        Commands::Whoami => {
            require_session(app)?;
            commands::auth::whoami(app)
        }
        Commands::CheckEmail { email } => commands::auth::check_email(app, &email).await,
        Commands::Refresh => {
            require_session(app)?;
            commands::auth::refresh(app).await
        }
        Commands::ChangePassword => {
            require_session(app)?;
            commands::auth::change_password(app).await
        }
        Commands::DeleteAccount => {
            require_session(app)?;
            commands::auth::delete_account(app).await
        }
        Commands::Watch => {
            require_session(app)?;
            commands::watch::run(app).await
        }
        Commands::Events { command } => {
            require_session(app)?;
            match command {
                EventCommands::List { month } => commands::events::list(app, month.as_deref()).await,
                EventCommands::New {
                    title,
                    start,
                    end,
                    duration,
                    description,
                } => {
                    commands::events::new(app, title, description, &start, end.as_deref(), &duration).await
                }
                EventCommands::Edit {
                    id,
                    month,
                    title,
                    start,
                    end,
                    description,
                } => {
                    let changes = commands::events::EventChanges {
                        title,
                        description,
                        start,
                        end,
                    };
                    commands::events::edit(app, &id, month.as_deref(), changes).await
                }
                EventCommands::Delete { id } => commands::events::delete(app, &id).await,
            }
        }
        Commands::Weather { city, days } => {
            require_session(app)?;
            commands::weather::run(app, &city, days).await
        }
        Commands::Settings { command } => match command {
            SettingsCommands::Show => commands::settings::show(app),
            SettingsCommands::Set {
                timezone,
                time_notation,
                week_start,
                focus_hour,
            } => commands::settings::set(
                app,
                timezone.as_deref(),
                time_notation.map(TimeNotation::from),
                week_start.map(|w| matches!(w, WeekStartArg::Sunday)),
                focus_hour,
            ),
        },
        Commands::Profile { command } => {
            require_session(app)?;
            match command {
                ProfileCommands::Pull => commands::settings::pull(app).await,
                ProfileCommands::Push => commands::settings::push(app).await,
            }
        }
        Commands::Config { command } => run_config(command),
    }
}

fn run_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => commands::config::show(),
        ConfigCommands::Set {
            api_url,
            data_dir,
            refresh_interval,
        } => commands::config::set(api_url, data_dir, refresh_interval),
    }
}

fn require_session(app: &Datebook) -> Result<()> {
    let landed = app.navigate(Route::Calendar);

    if landed != Route::Calendar {
        anyhow::bail!("Not signed in.\n\n{}", route_hint(landed));
    }

    Ok(())
}
