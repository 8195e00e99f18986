//! Daily forecasts shown next to the calendar, with a last-known cache.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::{self, ApiClient};
use crate::constants::{WEATHER_CACHE_KEY, WEATHER_ERROR_NOTICE_KEY, WEATHER_NOTICE_DEBOUNCE};
use crate::error::{DatebookError, DatebookResult};
use crate::notice::Notices;
use crate::session::SessionState;
use crate::storage::Storage;

const WEATHER_PATH: &str = "/v1/calendar/weather";
const ERROR_MESSAGE: &str = "There was an error fetching weather.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherType {
    Sunny,
    Cloudy,
    Rainy,
    Snowy,
    Foggy,
    Stormy,
    Windy,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    #[serde(deserialize_with = "date_or_datetime")]
    pub date: NaiveDate,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub min_temp_f: f64,
    pub max_temp_f: f64,
    pub weather_type: WeatherType,
}

/// A forecast day as the backend sends it (Celsius only).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawForecast {
    #[serde(deserialize_with = "date_or_datetime")]
    date: NaiveDate,
    min_temp_c: f64,
    max_temp_c: f64,
    weather_type: WeatherType,
}

impl From<RawForecast> for WeatherForecast {
    fn from(raw: RawForecast) -> Self {
        WeatherForecast {
            date: raw.date,
            min_temp_c: raw.min_temp_c,
            max_temp_c: raw.max_temp_c,
            min_temp_f: c_to_f(raw.min_temp_c),
            max_temp_f: c_to_f(raw.max_temp_c),
            weather_type: raw.weather_type,
        }
    }
}

pub fn c_to_f(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Accepts `2025-03-20` as well as a full RFC 3339 timestamp.
fn date_or_datetime<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;

    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(date);
    }

    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| serde::de::Error::custom(format!("invalid forecast date '{raw}'")))
}

pub struct WeatherStore {
    api: ApiClient,
    session: Arc<SessionState>,
    storage: Arc<dyn Storage>,
    notices: Arc<Notices>,
    forecast: Mutex<Vec<WeatherForecast>>,
}

impl WeatherStore {
    /// Create the store, starting from the cached forecast if there is one.
    pub fn new(api: ApiClient, session: Arc<SessionState>, storage: Arc<dyn Storage>, notices: Arc<Notices>) -> Self {
        let store = WeatherStore {
            api,
            session,
            storage,
            notices,
            forecast: Mutex::new(Vec::new()),
        };
        store.load_cached();
        store
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WeatherForecast>> {
        self.forecast.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn forecast(&self) -> Vec<WeatherForecast> {
        self.lock().clone()
    }

    pub fn forecast_for(&self, date: NaiveDate) -> Option<WeatherForecast> {
        self.lock().iter().find(|f| f.date == date).cloned()
    }

    /// Replace the in-memory forecast with the cached one. A cache that
    /// can't be read is removed.
    fn load_cached(&self) {
        let cached = match self.storage.get(WEATHER_CACHE_KEY) {
            Ok(Some(cached)) => cached,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read weather cache");
                return;
            }
        };

        match serde_json::from_str::<Vec<WeatherForecast>>(&cached) {
            Ok(forecast) => *self.lock() = forecast,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse cached weather");
                if let Err(e) = self.storage.remove(WEATHER_CACHE_KEY) {
                    tracing::warn!(error = %e, "failed to remove weather cache");
                }
            }
        }
    }

    fn cache(&self, forecast: &[WeatherForecast]) -> DatebookResult<()> {
        self.storage
            .set(WEATHER_CACHE_KEY, &serde_json::to_string(forecast)?)
    }

    /// Queue the error notice unless one went out recently.
    fn notify_error(&self) {
        let now = Utc::now();
        let last = self
            .storage
            .get(WEATHER_ERROR_NOTICE_KEY)
            .ok()
            .flatten()
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis);

        let due = match last {
            Some(last) => (now - last).to_std().map_or(true, |elapsed| elapsed > WEATHER_NOTICE_DEBOUNCE),
            None => true,
        };

        if due {
            self.notices.error(ERROR_MESSAGE);
            if let Err(e) = self
                .storage
                .set(WEATHER_ERROR_NOTICE_KEY, &now.timestamp_millis().to_string())
            {
                tracing::warn!(error = %e, "failed to record weather notice");
            }
        }
    }

    /// Fetch `days` days of forecast for `city`.
    ///
    /// Failures never bubble up: the current (or cached) forecast is
    /// returned and an error notice is queued at most once per debounce
    /// window.
    pub async fn fetch_weather(&self, city: &str, days: u32) -> Vec<WeatherForecast> {
        let Some(token) = self.session.access_token() else {
            self.notify_error();
            return self.forecast();
        };

        let resp = self
            .api
            .authed(Method::GET, WEATHER_PATH, &token)
            .query(&[("city", city.to_string()), ("days", days.to_string())])
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "weather request failed, using cache");
                self.load_cached();
                self.notify_error();
                return self.forecast();
            }
        };

        let forecast = match api::read_data::<Vec<RawForecast>>(resp).await {
            Ok(raw) => raw.into_iter().map(WeatherForecast::from).collect::<Vec<_>>(),
            Err(e) => {
                if !matches!(e, DatebookError::RequestFailed(_)) {
                    tracing::warn!(error = %e, "unreadable weather response");
                }
                self.notify_error();
                return self.forecast();
            }
        };

        if let Err(e) = self.cache(&forecast) {
            tracing::warn!(error = %e, "failed to cache weather");
        }
        *self.lock() = forecast.clone();
        forecast
    }
}
