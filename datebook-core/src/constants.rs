//! Storage keys and fixed cadences shared across the client.

use std::time::Duration;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const LAST_REFRESH_KEY: &str = "last_token_refresh";
pub const SETTINGS_KEY: &str = "settings";
pub const WEATHER_CACHE_KEY: &str = "weather_cache";
pub const WEATHER_ERROR_NOTICE_KEY: &str = "weather_error_toast";

/// Default cadence of the token refresh scheduler.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Minimum gap between two weather error notices.
pub const WEATHER_NOTICE_DEBOUNCE: Duration = Duration::from_secs(10 * 60);

/// How long a notice stays visible unless dismissed.
pub const DEFAULT_NOTICE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
