pub mod auth;
pub mod config;
pub mod events;
pub mod settings;
pub mod watch;
pub mod weather;

pub use crate::utils::tui::create_spinner;
