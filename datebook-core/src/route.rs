//! Navigation targets and the authentication guard in front of them.

use std::fmt;

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Sign-in entry point
    Auth,
    /// Sign-up entry point
    SignUp,
    /// The monthly calendar
    Calendar,
}

impl Route {
    pub fn requires_auth(self) -> bool {
        matches!(self, Route::Calendar)
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Auth => "/auth",
            Route::SignUp => "/auth/sign-up",
            Route::Calendar => "/",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Where navigation to `target` actually lands: the target itself, or the
/// sign-in entry point when it needs a session and there isn't one.
pub fn guard(target: Route, session: &SessionState) -> Route {
    if target.requires_auth() && !session.is_authenticated() {
        Route::Auth
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{make_token, memory_storage, signed_in_session};

    #[test]
    fn test_guard_redirects_when_signed_out() {
        let session = SessionState::new(memory_storage());

        assert_eq!(guard(Route::Calendar, &session), Route::Auth);
        assert_eq!(guard(Route::Auth, &session), Route::Auth);
        assert_eq!(guard(Route::SignUp, &session), Route::SignUp);
    }

    #[test]
    fn test_guard_allows_when_signed_in() {
        let session = signed_in_session(&make_token("1", "a@b.com", "A"));

        assert_eq!(guard(Route::Calendar, &session), Route::Calendar);
    }

    #[test]
    fn test_guard_redirects_after_logout() {
        let session = signed_in_session(&make_token("1", "a@b.com", "A"));
        session.clear().unwrap();

        assert_eq!(guard(Route::Calendar, &session), Route::Auth);
    }
}
