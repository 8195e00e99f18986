//! Credential requests against the backend.
//!
//! `AuthGateway` is the only writer of [`SessionState`]: login, sign-up and
//! refresh install a new token pair, logout and account deletion clear it.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::api::{self, ApiClient, Envelope, TokenPair};
use crate::error::{DatebookError, DatebookResult};
use crate::route::Route;
use crate::scheduler::Refresher;
use crate::session::SessionState;

const LOGIN_PATH: &str = "/v1/users/login";
const SIGN_UP_PATH: &str = "/v1/users/sign-up";
const CHECK_EMAIL_PATH: &str = "/v1/users/check-email";
const REFRESH_PATH: &str = "/v1/users/refresh-token";
const CHANGE_PASSWORD_PATH: &str = "/v1/users/change-password";
const ME_PATH: &str = "/v1/users/me";

/// Message the backend sends alongside a rejected login
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";

pub struct AuthGateway {
    api: ApiClient,
    session: Arc<SessionState>,
}

/// Keeps `loading` set for as long as it lives.
struct Loading<'a>(&'a SessionState);

impl<'a> Loading<'a> {
    fn start(session: &'a SessionState) -> Self {
        session.set_loading(true);
        Loading(session)
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.set_loading(false);
    }
}

impl AuthGateway {
    pub fn new(api: ApiClient, session: Arc<SessionState>) -> Self {
        AuthGateway { api, session }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Sign in and install the returned token pair. Returns the new access
    /// token.
    pub async fn login(&self, email: &str, password: &str) -> DatebookResult<String> {
        let _loading = Loading::start(&self.session);

        let resp = self
            .api
            .request(Method::POST, LOGIN_PATH)
            .json(&json!({ "identifier": email, "password": password }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "login request failed");
                DatebookError::ServerError
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = api::error_message(resp).await;
            if status == StatusCode::UNAUTHORIZED
                || message.as_deref() == Some(INVALID_CREDENTIALS_MESSAGE)
            {
                return Err(DatebookError::InvalidCredentials);
            }
            tracing::warn!(%status, ?message, "login rejected");
            return Err(DatebookError::ServerError);
        }

        let tokens = read_tokens(resp).await.map_err(|e| {
            tracing::warn!(error = %e, "unreadable login response");
            DatebookError::ServerError
        })?;

        self.install(tokens)
    }

    /// Create an account and sign in as it.
    pub async fn sign_up(&self, email: &str, name: &str, password: &str) -> DatebookResult<String> {
        let _loading = Loading::start(&self.session);

        let resp = self
            .api
            .request(Method::POST, SIGN_UP_PATH)
            .json(&json!({ "email": email, "name": name, "password": password }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "sign-up request failed");
                DatebookError::SignupFailed
            })?;

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "sign-up rejected");
            return Err(DatebookError::SignupFailed);
        }

        let tokens = read_tokens(resp)
            .await
            .map_err(|_| DatebookError::SignupFailed)?;

        self.install(tokens)
    }

    /// Whether `email` is still free to register.
    pub async fn check_email(&self, email: &str) -> DatebookResult<bool> {
        #[derive(Deserialize)]
        struct Availability {
            available: bool,
        }

        let resp = self
            .api
            .request(Method::GET, CHECK_EMAIL_PATH)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| DatebookError::AuthRequestFailed(e.to_string()))?;

        let availability: Availability = api::read_data(resp)
            .await
            .map_err(|e| DatebookError::AuthRequestFailed(e.to_string()))?;

        Ok(availability.available)
    }

    /// Forget the session locally. No request is made, so this can't fail
    /// on the network; only a storage error is reported.
    pub fn logout(&self) -> DatebookResult<()> {
        self.session.clear()
    }

    /// Trade the refresh token for a new pair. Returns the new access token.
    pub async fn refresh_access_token(&self) -> DatebookResult<String> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(DatebookError::NoRefreshToken)?;

        let resp = self
            .api
            .request(Method::POST, REFRESH_PATH)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| DatebookError::AuthRequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DatebookError::AuthRequestFailed(format!(
                "refresh rejected with status {}",
                resp.status()
            )));
        }

        let tokens = read_tokens(resp)
            .await
            .map_err(|e| DatebookError::AuthRequestFailed(e.to_string()))?;

        self.install(tokens)
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> DatebookResult<()> {
        let token = self.require_access_token()?;

        let resp = self
            .api
            .authed(Method::PUT, CHANGE_PASSWORD_PATH, &token)
            .json(&json!({ "oldPassword": old_password, "newPassword": new_password }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(DatebookError::RequestFailed(resp.status()));
        }

        Ok(())
    }

    /// Delete the account, then log out. Returns where the front end should
    /// go next.
    pub async fn delete_account(&self, password: &str) -> DatebookResult<Route> {
        let token = self.require_access_token()?;

        let resp = self
            .api
            .authed(Method::DELETE, ME_PATH, &token)
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(|e| DatebookError::AuthRequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DatebookError::AuthRequestFailed(format!(
                "account deletion rejected with status {}",
                resp.status()
            )));
        }

        self.logout()?;
        Ok(Route::SignUp)
    }

    fn require_access_token(&self) -> DatebookResult<String> {
        self.session
            .access_token()
            .ok_or(DatebookError::NotAuthenticated)
    }

    fn install(&self, tokens: TokenPair) -> DatebookResult<String> {
        self.session
            .set(&tokens.access_token, &tokens.refresh_token)?;
        Ok(tokens.access_token)
    }
}

async fn read_tokens(resp: reqwest::Response) -> DatebookResult<TokenPair> {
    let envelope: Envelope<TokenPair> = resp.json().await?;
    Ok(envelope.data)
}

#[async_trait]
impl Refresher for AuthGateway {
    // Storage is shared with other processes; a logout there must not be
    // undone by refreshing the pair still held in memory here.
    fn has_access_token(&self) -> bool {
        if let Err(e) = self.session.reload() {
            tracing::warn!(error = %e, "failed to reload session from storage");
        }
        self.session.is_authenticated()
    }

    async fn refresh(&self) -> DatebookResult<()> {
        self.refresh_access_token().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use crate::test_server::{UNREACHABLE, api, make_token, memory_storage, signed_in_session, spawn};
    use axum::Json;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::{delete, get, post, put};
    use serde_json::Value;
    use std::collections::HashMap;

    fn tokens_body(access: &str, refresh: &str) -> Json<Value> {
        Json(json!({ "data": { "accessToken": access, "refreshToken": refresh } }))
    }

    fn gateway_at(base_url: &str) -> AuthGateway {
        AuthGateway::new(api(base_url), Arc::new(SessionState::new(memory_storage())))
    }

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_login_installs_tokens() {
        let access = make_token("u1", "a@b.com", "Ada");
        let issued = access.clone();
        let router = Router::new().route(
            LOGIN_PATH,
            post(move |Json(body): Json<Value>| {
                let issued = issued.clone();
                async move {
                    assert_eq!(body["identifier"], "a@b.com");
                    assert_eq!(body["password"], "secret");
                    tokens_body(&issued, "refresh-1")
                }
            }),
        );
        let gateway = gateway_at(&spawn(router).await);

        let returned = gateway.login("a@b.com", "secret").await.unwrap();

        assert_eq!(returned, access);
        let session = gateway.session();
        assert_eq!(session.user().unwrap().name, "Ada");
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
        assert!(!session.is_loading());
        assert_eq!(
            session.storage().get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
            Some(access.as_str())
        );
    }

    #[tokio::test]
    async fn test_login_unauthorized_is_invalid_credentials() {
        let router = Router::new().route(
            LOGIN_PATH,
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "message": "Invalid credentials" })),
                )
            }),
        );
        let gateway = gateway_at(&spawn(router).await);

        let err = gateway.login("a@b.com", "wrong").await.unwrap_err();

        assert!(matches!(err, DatebookError::InvalidCredentials));
        assert!(!gateway.session().is_authenticated());
        assert!(!gateway.session().is_loading());
    }

    #[tokio::test]
    async fn test_login_server_failure_is_server_error() {
        let router = Router::new().route(
            LOGIN_PATH,
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let gateway = gateway_at(&spawn(router).await);

        let err = gateway.login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, DatebookError::ServerError));

        let offline = gateway_at(UNREACHABLE);
        let err = offline.login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, DatebookError::ServerError));
    }

    #[tokio::test]
    async fn test_login_with_undecodable_token_fails_cleanly() {
        let router = Router::new().route(
            LOGIN_PATH,
            post(|| async { tokens_body("not-a-jwt", "refresh") }),
        );
        let gateway = gateway_at(&spawn(router).await);

        let err = gateway.login("a@b.com", "pw").await.unwrap_err();

        assert!(matches!(err, DatebookError::TokenDecodeFailed(_)));
        assert_eq!(gateway.session().storage().get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_up() {
        let access = make_token("u9", "new@b.com", "Nia");
        let issued = access.clone();
        let router = Router::new().route(
            SIGN_UP_PATH,
            post(move |Json(body): Json<Value>| {
                let issued = issued.clone();
                async move {
                    assert_eq!(body["name"], "Nia");
                    tokens_body(&issued, "refresh-9")
                }
            }),
        );
        let gateway = gateway_at(&spawn(router).await);

        gateway.sign_up("new@b.com", "Nia", "pw").await.unwrap();
        assert_eq!(gateway.session().user().unwrap().email, "new@b.com");
    }

    #[tokio::test]
    async fn test_sign_up_failure() {
        let router = Router::new().route(SIGN_UP_PATH, post(|| async { StatusCode::CONFLICT }));
        let gateway = gateway_at(&spawn(router).await);

        let err = gateway.sign_up("dup@b.com", "D", "pw").await.unwrap_err();
        assert!(matches!(err, DatebookError::SignupFailed));

        let offline = gateway_at(UNREACHABLE);
        let err = offline.sign_up("dup@b.com", "D", "pw").await.unwrap_err();
        assert!(matches!(err, DatebookError::SignupFailed));
    }

    #[tokio::test]
    async fn test_check_email() {
        let router = Router::new().route(
            CHECK_EMAIL_PATH,
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let taken = params.get("email").map(String::as_str) == Some("taken@b.com");
                Json(json!({ "data": { "available": !taken } }))
            }),
        );
        let gateway = gateway_at(&spawn(router).await);

        assert!(gateway.check_email("free@b.com").await.unwrap());
        assert!(!gateway.check_email("taken@b.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_without_network_clears_storage() {
        let session = signed_in_session(&make_token("u1", "a@b.com", "Ada"));
        let gateway = AuthGateway::new(api(UNREACHABLE), session.clone());

        gateway.logout().unwrap();

        assert!(session.user().is_none());
        assert_eq!(session.storage().get(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(session.storage().get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_requires_refresh_token() {
        let gateway = gateway_at(UNREACHABLE);

        let err = gateway.refresh_access_token().await.unwrap_err();
        assert!(matches!(err, DatebookError::NoRefreshToken));
    }

    #[tokio::test]
    async fn test_refresh_replaces_pair() {
        let fresh = make_token("u1", "a@b.com", "Ada Renamed");
        let issued = fresh.clone();
        let router = Router::new().route(
            REFRESH_PATH,
            post(move |Json(body): Json<Value>| {
                let issued = issued.clone();
                async move {
                    assert_eq!(body["refreshToken"], "refresh-token");
                    tokens_body(&issued, "refresh-next")
                }
            }),
        );
        let session = signed_in_session(&make_token("u1", "a@b.com", "Ada"));
        let gateway = AuthGateway::new(api(&spawn(router).await), session.clone());

        let returned = gateway.refresh_access_token().await.unwrap();

        assert_eq!(returned, fresh);
        assert_eq!(session.user().unwrap().name, "Ada Renamed");
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-next"));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_pair() {
        let router = Router::new().route(REFRESH_PATH, post(|| async { StatusCode::UNAUTHORIZED }));
        let original = make_token("u1", "a@b.com", "Ada");
        let session = signed_in_session(&original);
        let gateway = AuthGateway::new(api(&spawn(router).await), session.clone());

        let err = gateway.refresh_access_token().await.unwrap_err();

        assert!(matches!(err, DatebookError::AuthRequestFailed(_)));
        assert_eq!(session.access_token().as_deref(), Some(original.as_str()));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-token"));
    }

    #[tokio::test]
    async fn test_change_password_requires_session() {
        let gateway = gateway_at(UNREACHABLE);

        let err = gateway.change_password("old", "new").await.unwrap_err();
        assert!(matches!(err, DatebookError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_change_password_sends_bearer() {
        let access = make_token("u1", "a@b.com", "Ada");
        let expected = access.clone();
        let router = Router::new().route(
            CHANGE_PASSWORD_PATH,
            put(move |headers: HeaderMap, Json(body): Json<Value>| {
                let expected = expected.clone();
                async move {
                    if bearer(&headers).as_deref() != Some(expected.as_str()) {
                        return StatusCode::UNAUTHORIZED;
                    }
                    if body["oldPassword"] != "old" {
                        return StatusCode::BAD_REQUEST;
                    }
                    StatusCode::OK
                }
            }),
        );
        let session = signed_in_session(&access);
        let gateway = AuthGateway::new(api(&spawn(router).await), session.clone());

        gateway.change_password("old", "new").await.unwrap();
        assert!(session.is_authenticated());

        let err = gateway.change_password("wrong", "new").await.unwrap_err();
        assert!(matches!(
            err,
            DatebookError::RequestFailed(StatusCode::BAD_REQUEST)
        ));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_delete_account_logs_out() {
        let router = Router::new().route(
            ME_PATH,
            delete(|headers: HeaderMap| async move {
                if bearer(&headers).is_some() {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }),
        );
        let session = signed_in_session(&make_token("u1", "a@b.com", "Ada"));
        let gateway = AuthGateway::new(api(&spawn(router).await), session.clone());

        let next = gateway.delete_account("pw").await.unwrap();

        assert_eq!(next, Route::SignUp);
        assert!(!session.is_authenticated());
        assert_eq!(session.storage().get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_account_failure_keeps_session() {
        let router = Router::new().route(ME_PATH, delete(|| async { StatusCode::FORBIDDEN }));
        let session = signed_in_session(&make_token("u1", "a@b.com", "Ada"));
        let gateway = AuthGateway::new(api(&spawn(router).await), session.clone());

        let err = gateway.delete_account("wrong").await.unwrap_err();

        assert!(matches!(err, DatebookError::AuthRequestFailed(_)));
        assert!(session.is_authenticated());
    }
}
