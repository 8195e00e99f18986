//! Core library for the datebook calendar client.
//!
//! This crate holds everything the front end needs to talk to the datebook
//! backend:
//! - `session` and `auth` for the signed-in identity and credential requests
//! - `scheduler` for keeping the access token fresh in the background
//! - `settings`, `events` and `weather` stores for the calendar views
//! - `storage` for the durable key/value store everything persists into

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod notice;
pub mod route;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod storage;
pub mod token;
pub mod weather;

#[cfg(test)]
pub(crate) mod test_server;

pub use app::Datebook;
pub use error::{DatebookError, DatebookResult};
