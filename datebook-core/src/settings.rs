//! Personal display settings and the calendar math that depends on them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, Days, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::{self, ApiClient};
use crate::constants::SETTINGS_KEY;
use crate::error::{DatebookError, DatebookResult};
use crate::session::SessionState;
use crate::storage::Storage;

const PROFILE_PATH: &str = "/v1/users/me";

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeNotation {
    #[serde(rename = "12")]
    TwelveHour,
    #[serde(rename = "24")]
    TwentyFourHour,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub time_notation: TimeNotation,
    pub starts_with_sunday: bool,
    pub focus_hour_on_start: bool,
    pub timezone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            time_notation: TimeNotation::TwelveHour,
            starts_with_sunday: false,
            focus_hour_on_start: true,
            timezone: "UTC".to_string(),
        }
    }
}

/// Profile fields the backend keeps for the user. Anything missing is left
/// untouched locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_notation: Option<TimeNotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with_sunday: Option<bool>,
}

pub fn parse_timezone(name: &str) -> DatebookResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| DatebookError::InvalidTimezone(name.to_string()))
}

/// Resolve a wall-clock time in `tz`. Times skipped by a DST jump resolve to
/// the first valid instant after them.
fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => local_to_utc(tz, local + chrono::Duration::hours(1)),
    }
}

impl Settings {
    pub fn tz(&self) -> DatebookResult<Tz> {
        parse_timezone(&self.timezone)
    }

    /// Interpret a wall-clock time in the configured timezone.
    pub fn to_utc(&self, local: NaiveDateTime) -> DatebookResult<DateTime<Utc>> {
        Ok(local_to_utc(self.tz()?, local))
    }

    pub fn week_start(&self) -> Weekday {
        if self.starts_with_sunday {
            Weekday::Sun
        } else {
            Weekday::Mon
        }
    }

    /// Column headers for a week, in display order.
    pub fn day_names(&self) -> Vec<&'static str> {
        if self.starts_with_sunday {
            DAY_NAMES.to_vec()
        } else {
            DAY_NAMES[1..].iter().chain(&DAY_NAMES[..1]).copied().collect()
        }
    }

    /// Format the time of day of `at` in the configured timezone and notation.
    pub fn format_time(&self, at: DateTime<Utc>) -> DatebookResult<String> {
        let local = at.with_timezone(&self.tz()?);
        let formatted = match self.time_notation {
            TimeNotation::TwelveHour => local.format("%-I:%M %p"),
            TimeNotation::TwentyFourHour => local.format("%H:%M"),
        };
        Ok(formatted.to_string())
    }

    /// First day of the week containing `date`.
    pub fn start_of_week(&self, date: NaiveDate) -> NaiveDate {
        let offset = if self.starts_with_sunday {
            date.weekday().num_days_from_sunday()
        } else {
            date.weekday().num_days_from_monday()
        };
        date - Days::new(u64::from(offset))
    }

    /// Last day of the week containing `date`.
    pub fn end_of_week(&self, date: NaiveDate) -> NaiveDate {
        self.start_of_week(date) + Days::new(6)
    }

    /// The span a month view shows: from the start of the week holding the
    /// 1st to the end of the week holding the last day, as UTC instants.
    /// The end is exclusive.
    pub fn month_range(&self, year: i32, month: u32) -> DatebookResult<(DateTime<Utc>, DateTime<Utc>)> {
        let tz = self.tz()?;

        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DatebookError::Config(format!("invalid month {year}-{month}")))?;
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| DatebookError::Config(format!("invalid month {year}-{month}")))?;

        let start = self.start_of_week(first).and_time(NaiveTime::MIN);
        let end = (self.end_of_week(last) + Days::new(1)).and_time(NaiveTime::MIN);

        Ok((local_to_utc(tz, start), local_to_utc(tz, end)))
    }

    /// Month range of the month `at` falls in, in the configured timezone.
    pub fn visible_month_range(&self, at: DateTime<Utc>) -> DatebookResult<(DateTime<Utc>, DateTime<Utc>)> {
        let local = at.with_timezone(&self.tz()?);
        self.month_range(local.year(), local.month())
    }

    fn merge(&mut self, profile: &ProfileSettings) {
        if let Some(tz) = &profile.timezone {
            if parse_timezone(tz).is_ok() {
                self.timezone = tz.clone();
            } else {
                tracing::warn!(timezone = %tz, "ignoring unknown timezone from profile");
            }
        }
        if let Some(notation) = profile.time_notation {
            self.time_notation = notation;
        }
        if let Some(sunday) = profile.starts_with_sunday {
            self.starts_with_sunday = sunday;
        }
    }
}

pub struct SettingsStore {
    storage: Arc<dyn Storage>,
    api: ApiClient,
    session: Arc<SessionState>,
    settings: Mutex<Settings>,
}

impl SettingsStore {
    /// Load saved settings, falling back to defaults when none are stored or
    /// the stored blob can't be read.
    pub fn load(storage: Arc<dyn Storage>, api: ApiClient, session: Arc<SessionState>) -> DatebookResult<Self> {
        let settings = match storage.get(SETTINGS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "stored settings are unreadable, using defaults");
                Settings::default()
            }),
            None => Settings::default(),
        };

        Ok(SettingsStore {
            storage,
            api,
            session,
            settings: Mutex::new(settings),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Settings {
        self.lock().clone()
    }

    fn update(&self, change: impl FnOnce(&mut Settings)) -> DatebookResult<Settings> {
        let mut settings = self.lock();
        let mut next = settings.clone();
        change(&mut next);

        self.storage.set(SETTINGS_KEY, &serde_json::to_string(&next)?)?;
        *settings = next.clone();
        Ok(next)
    }

    pub fn set_timezone(&self, timezone: &str) -> DatebookResult<Settings> {
        parse_timezone(timezone)?;
        self.update(|s| s.timezone = timezone.to_string())
    }

    pub fn set_time_notation(&self, notation: TimeNotation) -> DatebookResult<Settings> {
        self.update(|s| s.time_notation = notation)
    }

    pub fn set_starts_with_sunday(&self, starts_with_sunday: bool) -> DatebookResult<Settings> {
        self.update(|s| s.starts_with_sunday = starts_with_sunday)
    }

    pub fn set_focus_hour_on_start(&self, focus: bool) -> DatebookResult<Settings> {
        self.update(|s| s.focus_hour_on_start = focus)
    }

    /// Pull the profile's settings from the backend into local settings.
    pub async fn fetch_profile(&self) -> DatebookResult<Settings> {
        let token = self
            .session
            .access_token()
            .ok_or(DatebookError::NotAuthenticated)?;

        let resp = self
            .api
            .authed(Method::GET, PROFILE_PATH, &token)
            .send()
            .await?;
        let profile: ProfileSettings = api::read_data(resp).await?;

        self.update(|s| s.merge(&profile))
    }

    /// Push `patch` to the backend, then apply it locally.
    pub async fn update_profile(&self, patch: &ProfileSettings) -> DatebookResult<Settings> {
        if let Some(tz) = &patch.timezone {
            parse_timezone(tz)?;
        }

        let token = self
            .session
            .access_token()
            .ok_or(DatebookError::NotAuthenticated)?;

        let resp = self
            .api
            .authed(Method::PATCH, PROFILE_PATH, &token)
            .json(patch)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(DatebookError::RequestFailed(resp.status()));
        }

        self.update(|s| s.merge(patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{UNREACHABLE, api, make_token, memory_storage, signed_in_session, spawn};
    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::{Value, json};

    fn store(storage: Arc<dyn Storage>) -> SettingsStore {
        let session = Arc::new(SessionState::new(storage.clone()));
        SettingsStore::load(storage, api(UNREACHABLE), session).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_defaults_when_nothing_stored() {
        let store = store(memory_storage());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn test_defaults_when_blob_is_corrupt() {
        let storage = memory_storage();
        storage.set(SETTINGS_KEY, "{oops").unwrap();

        assert_eq!(store(storage).get(), Settings::default());
    }

    #[test]
    fn test_partial_blob_keeps_present_fields() {
        let storage = memory_storage();
        storage
            .set(SETTINGS_KEY, r#"{"timezone":"Europe/Paris","timeNotation":"24"}"#)
            .unwrap();

        let settings = store(storage).get();
        assert_eq!(settings.timezone, "Europe/Paris");
        assert_eq!(settings.time_notation, TimeNotation::TwentyFourHour);
        assert!(!settings.starts_with_sunday);
        assert!(settings.focus_hour_on_start);
    }

    #[test]
    fn test_settings_persist_across_loads() {
        let storage = memory_storage();
        let first = store(storage.clone());
        first.set_timezone("Europe/Paris").unwrap();
        first.set_time_notation(TimeNotation::TwentyFourHour).unwrap();
        first.set_starts_with_sunday(true).unwrap();

        let raw: Value = serde_json::from_str(&storage.get(SETTINGS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["timeNotation"], "24");
        assert_eq!(raw["timezone"], "Europe/Paris");

        let second = store(storage);
        assert_eq!(second.get(), first.get());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let store = store(memory_storage());

        let err = store.set_timezone("Mars/Olympus").unwrap_err();
        assert!(matches!(err, DatebookError::InvalidTimezone(_)));
        assert_eq!(store.get().timezone, "UTC");
    }

    #[test]
    fn test_day_names_follow_week_start() {
        let mut settings = Settings::default();
        assert_eq!(
            settings.day_names(),
            ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"]
        );

        settings.starts_with_sunday = true;
        assert_eq!(settings.day_names()[0], "SUN");
    }

    #[test]
    fn test_format_time_notation() {
        let mut settings = Settings::default();
        let at = utc("2025-03-20T15:05:00Z");

        assert_eq!(settings.format_time(at).unwrap(), "3:05 PM");

        settings.time_notation = TimeNotation::TwentyFourHour;
        settings.timezone = "Asia/Tokyo".into();
        assert_eq!(settings.format_time(at).unwrap(), "00:05");
    }

    #[test]
    fn test_month_range_monday_start() {
        let settings = Settings::default();

        // March 2025: 1st is a Saturday, 31st is a Monday
        let (start, end) = settings.month_range(2025, 3).unwrap();
        assert_eq!(start, utc("2025-02-24T00:00:00Z"));
        assert_eq!(end, utc("2025-04-07T00:00:00Z"));
    }

    #[test]
    fn test_month_range_sunday_start_in_timezone() {
        let settings = Settings {
            starts_with_sunday: true,
            timezone: "America/New_York".into(),
            ..Settings::default()
        };

        let (start, end) = settings.month_range(2025, 3).unwrap();
        // Sunday Feb 23 00:00 EST and Sunday Apr 6 00:00 EDT
        assert_eq!(start, utc("2025-02-23T05:00:00Z"));
        assert_eq!(end, utc("2025-04-06T04:00:00Z"));
    }

    #[test]
    fn test_visible_month_uses_local_month() {
        let settings = Settings {
            timezone: "Asia/Tokyo".into(),
            ..Settings::default()
        };

        // Still February in UTC, already March in Tokyo
        let at = utc("2025-02-28T20:00:00Z");
        assert_eq!(
            settings.visible_month_range(at).unwrap(),
            settings.month_range(2025, 3).unwrap()
        );
    }

    #[test]
    fn test_to_utc_skips_dst_gap() {
        let settings = Settings {
            timezone: "America/New_York".into(),
            ..Settings::default()
        };
        let local = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap();

        assert_eq!(settings.to_utc(local("2025-03-20T15:00")).unwrap(), utc("2025-03-20T19:00:00Z"));
        // 02:30 doesn't exist on the spring-forward day
        assert_eq!(settings.to_utc(local("2025-03-09T02:30")).unwrap(), utc("2025-03-09T07:30:00Z"));
    }

    #[tokio::test]
    async fn test_fetch_profile_merges() {
        let router = Router::new().route(
            PROFILE_PATH,
            get(|| async {
                Json(json!({ "data": {
                    "email": "a@b.com",
                    "timezone": "Europe/Berlin",
                    "timeNotation": "24",
                } }))
            }),
        );
        let base = spawn(router).await;
        let session = signed_in_session(&make_token("1", "a@b.com", "A"));
        let store = SettingsStore::load(session.storage().clone(), api(&base), session).unwrap();

        let settings = store.fetch_profile().await.unwrap();

        assert_eq!(settings.timezone, "Europe/Berlin");
        assert_eq!(settings.time_notation, TimeNotation::TwentyFourHour);
        assert!(!settings.starts_with_sunday);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let router = Router::new().route(
            PROFILE_PATH,
            axum::routing::patch(|Json(body): Json<Value>| async move {
                if body["startsWithSunday"] == true {
                    StatusCode::OK
                } else {
                    StatusCode::BAD_REQUEST
                }
            }),
        );
        let base = spawn(router).await;
        let session = signed_in_session(&make_token("1", "a@b.com", "A"));
        let store = SettingsStore::load(session.storage().clone(), api(&base), session).unwrap();

        let patch = ProfileSettings {
            starts_with_sunday: Some(true),
            ..ProfileSettings::default()
        };
        assert!(store.update_profile(&patch).await.unwrap().starts_with_sunday);

        let patch = ProfileSettings {
            starts_with_sunday: Some(false),
            ..ProfileSettings::default()
        };
        let err = store.update_profile(&patch).await.unwrap_err();
        assert!(matches!(err, DatebookError::RequestFailed(_)));
        assert!(store.get().starts_with_sunday);
    }

    #[tokio::test]
    async fn test_profile_requires_session() {
        let store = store(memory_storage());

        assert!(matches!(
            store.fetch_profile().await.unwrap_err(),
            DatebookError::NotAuthenticated
        ));
    }
}
