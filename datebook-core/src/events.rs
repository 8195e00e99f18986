//! Calendar events: listing for the visible range and create/modify/delete.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::{self, ApiClient};
use crate::error::{DatebookError, DatebookResult};
use crate::notice::Notices;
use crate::session::SessionState;
use crate::settings::SettingsStore;
use crate::token::string_or_number;

const EVENTS_PATH: &str = "/v1/calendar/events";
const CREATE_PATH: &str = "/v1/calendar/create";
const MODIFY_PATH: &str = "/v1/calendar/modify";
const DELETE_PATH: &str = "/v1/calendar/delete";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEvent {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The fields sent when creating or modifying an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&TimeEvent> for EventDraft {
    fn from(event: &TimeEvent) -> Self {
        EventDraft {
            title: event.title.clone(),
            description: event.description.clone(),
            start: event.start,
            end: event.end,
        }
    }
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct EventStore {
    api: ApiClient,
    session: Arc<SessionState>,
    settings: Arc<SettingsStore>,
    notices: Arc<Notices>,
    events: Mutex<Vec<TimeEvent>>,
    /// Set when the last fetch failed and `events` is what was known before
    stale: AtomicBool,
}

impl EventStore {
    pub fn new(
        api: ApiClient,
        session: Arc<SessionState>,
        settings: Arc<SettingsStore>,
        notices: Arc<Notices>,
    ) -> Self {
        EventStore {
            api,
            session,
            settings,
            notices,
            events: Mutex::new(Vec::new()),
            stale: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TimeEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The last events fetched.
    pub fn events(&self) -> Vec<TimeEvent> {
        self.lock().clone()
    }

    /// Whether the last `fetch_events` fell back to previously fetched events.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// Without a session the stores can't do anything useful; drop whatever
    /// is left of it so the front end sends the user back to sign in.
    fn require_session(&self, message: &str) -> DatebookResult<String> {
        if let Some(token) = self.session.access_token() {
            return Ok(token);
        }

        self.notices.error(message);
        if let Err(e) = self.session.clear() {
            tracing::warn!(error = %e, "failed to clear session");
        }
        Err(DatebookError::NotAuthenticated)
    }

    /// Fetch events in `range`, defaulting to the month view around now.
    ///
    /// When the backend can't be reached or rejects the request, an error
    /// notice is queued and the last fetched events are returned instead.
    pub async fn fetch_events(&self, range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> DatebookResult<Vec<TimeEvent>> {
        let (start, end) = match range {
            Some(range) => range,
            None => self.settings.get().visible_month_range(Utc::now())?,
        };

        let token =
            self.require_session("There was an error fetching events. Please try logging in again.")?;

        let result: DatebookResult<Vec<TimeEvent>> = async {
            let resp = self
                .api
                .authed(Method::GET, EVENTS_PATH, &token)
                .query(&[("start", iso(start)), ("end", iso(end))])
                .send()
                .await?;
            api::read_data::<Vec<TimeEvent>>(resp).await
        }
        .await;

        match result {
            Ok(events) => {
                *self.lock() = events.clone();
                self.stale.store(false, Ordering::SeqCst);
                Ok(events)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch events, keeping last known");
                self.stale.store(true, Ordering::SeqCst);
                self.notices.error("There was an error fetching events.");
                Ok(self.events())
            }
        }
    }

    /// Create an event, then refetch the visible range.
    pub async fn create_event(&self, draft: &EventDraft) -> DatebookResult<()> {
        if draft.title.trim().is_empty() {
            self.notices
                .error("You need to give this event a title before creating it.");
            return Err(DatebookError::MissingTitle);
        }

        let token = self.require_session("There was an error creating this event.")?;

        let resp = self
            .api
            .authed(Method::POST, CREATE_PATH, &token)
            .json(draft)
            .send()
            .await;
        self.check_mutation(resp, "There was an error creating this event. Please try again.")?;

        self.notices.success("Event created successfully.");
        self.fetch_events(None).await?;
        Ok(())
    }

    pub async fn modify_event(&self, event: &TimeEvent) -> DatebookResult<()> {
        if event.id.is_empty() {
            self.notices.error("There was an error modifying this event.");
            return Err(DatebookError::MissingEventId);
        }

        let token = self.require_session("There was an error modifying this event.")?;

        let resp = self
            .api
            .authed(Method::PUT, &format!("{MODIFY_PATH}/{}", event.id), &token)
            .json(&EventDraft::from(event))
            .send()
            .await;
        self.check_mutation(resp, "There was an error modifying this event. Please try again.")?;

        if let Some(existing) = self.lock().iter_mut().find(|e| e.id == event.id) {
            *existing = event.clone();
        }
        self.notices.success("Event modified successfully.");
        Ok(())
    }

    pub async fn delete_event(&self, id: &str) -> DatebookResult<()> {
        if id.is_empty() {
            self.notices.error("There was an error deleting this event.");
            return Err(DatebookError::MissingEventId);
        }

        let token = self.require_session("There was an error deleting this event.")?;

        let resp = self
            .api
            .authed(Method::DELETE, &format!("{DELETE_PATH}/{id}"), &token)
            .send()
            .await;
        self.check_mutation(resp, "There was an error deleting this event. Please try again.")?;

        self.lock().retain(|e| e.id != id);
        self.notices.success("Event deleted successfully.");
        Ok(())
    }

    fn check_mutation(&self, resp: reqwest::Result<reqwest::Response>, message: &str) -> DatebookResult<()> {
        let outcome = match resp {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(DatebookError::RequestFailed(resp.status())),
            Err(e) => Err(DatebookError::Http(e)),
        };

        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "event request failed");
            self.notices.error(message);
        }
        outcome
    }
}
