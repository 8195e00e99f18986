//! The client context: every store wired to one storage and one session.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::auth::AuthGateway;
use crate::config::DatebookConfig;
use crate::error::DatebookResult;
use crate::events::EventStore;
use crate::notice::Notices;
use crate::route::{self, Route};
use crate::scheduler::RefreshScheduler;
use crate::session::SessionState;
use crate::settings::SettingsStore;
use crate::storage::{FileStorage, Storage};
use crate::weather::WeatherStore;

/// Built once at start-up and handed to whatever needs it.
pub struct Datebook {
    pub config: DatebookConfig,
    pub storage: Arc<dyn Storage>,
    pub session: Arc<SessionState>,
    pub auth: Arc<AuthGateway>,
    pub settings: Arc<SettingsStore>,
    pub events: EventStore,
    pub weather: WeatherStore,
    pub notices: Arc<Notices>,
}

impl Datebook {
    /// Open the file-backed storage named by `config` and restore the
    /// session from it.
    pub fn open(config: DatebookConfig) -> DatebookResult<Self> {
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(config.storage_path())?);
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: DatebookConfig, storage: Arc<dyn Storage>) -> DatebookResult<Self> {
        let api = ApiClient::new(&config.api_base_url)?;

        let session = Arc::new(SessionState::restored(storage.clone())?);
        let notices = Arc::new(Notices::new());
        let auth = Arc::new(AuthGateway::new(api.clone(), session.clone()));
        let settings = Arc::new(SettingsStore::load(
            storage.clone(),
            api.clone(),
            session.clone(),
        )?);
        let events = EventStore::new(api.clone(), session.clone(), settings.clone(), notices.clone());
        let weather = WeatherStore::new(api, session.clone(), storage.clone(), notices.clone());

        Ok(Datebook {
            config,
            storage,
            session,
            auth,
            settings,
            events,
            weather,
            notices,
        })
    }

    /// Where navigating to `target` lands given the current session.
    pub fn navigate(&self, target: Route) -> Route {
        route::guard(target, &self.session)
    }

    /// A token refresh scheduler bound to this session. It stops on its own
    /// when the session is cleared.
    pub fn refresh_scheduler(&self) -> DatebookResult<RefreshScheduler> {
        Ok(RefreshScheduler::new(
            self.auth.clone(),
            self.storage.clone(),
            self.config.refresh_interval()?,
        )
        .stop_on_sign_out(self.session.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ACCESS_TOKEN_KEY;
    use crate::scheduler::SchedulerState;
    use crate::test_server::{UNREACHABLE, make_token, memory_storage};

    fn config() -> DatebookConfig {
        DatebookConfig {
            api_base_url: UNREACHABLE.into(),
            ..DatebookConfig::default()
        }
    }

    #[test]
    fn test_open_restores_session_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatebookConfig {
            data_dir: dir.path().to_path_buf(),
            ..config()
        };

        let first = Datebook::open(config.clone()).unwrap();
        first
            .session
            .set(&make_token("u1", "a@b.com", "Ada"), "refresh")
            .unwrap();
        drop(first);

        let second = Datebook::open(config).unwrap();
        assert_eq!(second.session.user().unwrap().name, "Ada");
        assert_eq!(second.navigate(Route::Calendar), Route::Calendar);
    }

    #[test]
    fn test_navigate_signed_out() {
        let app = Datebook::with_storage(config(), memory_storage()).unwrap();
        assert_eq!(app.navigate(Route::Calendar), Route::Auth);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_stops_scheduler() {
        let storage = memory_storage();
        storage
            .set(ACCESS_TOKEN_KEY, &make_token("u1", "a@b.com", "Ada"))
            .unwrap();
        let app = Datebook::with_storage(config(), storage.clone()).unwrap();

        let scheduler = app.refresh_scheduler().unwrap();
        // Pretend a refresh just happened so the first fire is an hour out
        storage
            .set(
                crate::constants::LAST_REFRESH_KEY,
                &chrono::Utc::now().timestamp_millis().to_string(),
            )
            .unwrap();
        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Scheduled);

        app.auth.logout().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(storage.get(crate::constants::LAST_REFRESH_KEY).unwrap(), None);
    }

    #[test]
    fn test_logout_in_another_client_is_not_undone() {
        use crate::constants::REFRESH_TOKEN_KEY;
        use crate::scheduler::Refresher;

        let dir = tempfile::tempdir().unwrap();
        let config = DatebookConfig {
            data_dir: dir.path().to_path_buf(),
            ..config()
        };

        let watcher = Datebook::open(config.clone()).unwrap();
        watcher
            .session
            .set(&make_token("u1", "a@b.com", "Ada"), "refresh")
            .unwrap();

        let other = Datebook::open(config.clone()).unwrap();
        other.auth.logout().unwrap();
        other.settings.set_timezone("Europe/Paris").unwrap();

        // The scheduler asks before every refresh
        assert!(!watcher.auth.has_access_token());
        assert!(!watcher.session.is_authenticated());

        let reopened = Datebook::open(config).unwrap();
        assert_eq!(reopened.storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(reopened.storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
        assert_eq!(reopened.settings.get().timezone, "Europe/Paris");
    }
}
