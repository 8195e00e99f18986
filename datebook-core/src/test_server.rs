//! Helpers for tests: a throwaway backend on an ephemeral port and a token
//! minter.

use std::sync::Arc;

use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::api::ApiClient;
use crate::session::SessionState;
use crate::storage::{MemoryStorage, Storage};

/// Build an unsigned JWT carrying the given identity.
pub(crate) fn make_token(id: &str, email: &str, name: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "id": id, "email": email, "name": name }).to_string(),
    );
    format!("{header}.{payload}.signature")
}

/// Serve `router` on 127.0.0.1 and return its base URL.
pub(crate) async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

/// A base URL nothing listens on.
pub(crate) const UNREACHABLE: &str = "http://127.0.0.1:1";

pub(crate) fn memory_storage() -> Arc<dyn Storage> {
    Arc::new(MemoryStorage::new())
}

/// Session over fresh memory storage, signed in as a fixed test user.
pub(crate) fn signed_in_session(access_token: &str) -> Arc<SessionState> {
    let session = Arc::new(SessionState::new(memory_storage()));
    session.set(access_token, "refresh-token").unwrap();
    session
}

pub(crate) fn api(base_url: &str) -> ApiClient {
    ApiClient::new(base_url).unwrap()
}
