//! The signed-in session: who is logged in and with which tokens.
//!
//! `SessionState` is the single in-memory copy of the token pair. Every
//! mutation goes through it so memory and durable storage never disagree,
//! and `user` is only ever present alongside a decodable access token.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::DatebookResult;
use crate::storage::Storage;
use crate::token::{self, User};

/// Snapshot of the session fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub loading: bool,
}

pub struct SessionState {
    storage: Arc<dyn Storage>,
    inner: Mutex<Session>,
    signed_in: watch::Sender<bool>,
}

impl SessionState {
    /// An empty session over `storage`. Call [`restore`](Self::restore) to
    /// pick up tokens from a previous run.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let (signed_in, _) = watch::channel(false);

        SessionState {
            storage,
            inner: Mutex::new(Session::default()),
            signed_in,
        }
    }

    /// Construct and restore in one step, the way the app starts up.
    pub fn restored(storage: Arc<dyn Storage>) -> DatebookResult<Self> {
        let state = Self::new(storage);
        state.restore()?;
        Ok(state)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the token pair from durable storage.
    ///
    /// Returns the restored user, or `None` when nothing was stored or the
    /// stored access token could not be decoded. In the latter case the
    /// stored pair is removed.
    pub fn restore(&self) -> DatebookResult<Option<User>> {
        let Some(access_token) = self.storage.get(ACCESS_TOKEN_KEY)? else {
            return Ok(None);
        };
        let refresh_token = self.storage.get(REFRESH_TOKEN_KEY)?;

        let mut session = self.lock();

        match token::decode(&access_token) {
            Ok(decoded) => {
                session.user = Some(decoded.user.clone());
                session.access_token = Some(access_token);
                session.refresh_token = refresh_token;
                drop(session);

                self.signed_in.send_replace(true);
                Ok(Some(decoded.user))
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored access token is unreadable, clearing session");

                session.user = None;
                session.access_token = None;
                session.refresh_token = None;
                self.storage
                    .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?;
                drop(session);

                self.signed_in.send_replace(false);
                Ok(None)
            }
        }
    }

    /// Re-read the token pair from durable storage, picking up changes made
    /// by other processes sharing it. Unlike [`restore`](Self::restore), a
    /// pair that has disappeared from storage signs this session out too.
    pub fn reload(&self) -> DatebookResult<Option<User>> {
        if self.storage.get(ACCESS_TOKEN_KEY)?.is_some() {
            return self.restore();
        }

        let mut session = self.lock();
        let was_signed_in = session.access_token.is_some();
        session.user = None;
        session.access_token = None;
        session.refresh_token = None;
        drop(session);

        if was_signed_in {
            tracing::info!("session was cleared elsewhere, signing out");
            self.signed_in.send_replace(false);
        }
        Ok(None)
    }

    /// Replace the token pair. The access token is decoded first; if that
    /// fails nothing in memory or storage changes.
    pub fn set(&self, access_token: &str, refresh_token: &str) -> DatebookResult<User> {
        let decoded = token::decode(access_token)?;

        let mut session = self.lock();

        self.storage.set_many(&[
            (ACCESS_TOKEN_KEY, access_token),
            (REFRESH_TOKEN_KEY, refresh_token),
        ])?;

        session.user = Some(decoded.user.clone());
        session.access_token = Some(access_token.to_string());
        session.refresh_token = Some(refresh_token.to_string());
        drop(session);

        self.signed_in.send_replace(true);
        Ok(decoded.user)
    }

    /// Forget the session in memory and in storage.
    ///
    /// Memory is cleared even when the storage write fails; the error is
    /// still returned so callers can report it.
    pub fn clear(&self) -> DatebookResult<()> {
        let mut session = self.lock();

        session.user = None;
        session.access_token = None;
        session.refresh_token = None;
        let removed = self
            .storage
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]);
        drop(session);

        self.signed_in.send_replace(false);
        removed
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.lock().loading = loading;
    }

    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().access_token.is_some()
    }

    /// Watch for sign-in/sign-out transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signed_in.subscribe()
    }
}
