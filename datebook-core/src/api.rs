//! HTTP plumbing shared by the gateway and the stores.
//!
//! Every success response from the backend wraps its payload as
//! `{"data": ...}`; failures may carry `{"message": ...}`.

use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{DatebookError, DatebookResult};

#[derive(Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Token pair as issued by login, sign-up and refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// HTTP client for the datebook backend
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client for `base_url`. Cookies set by the backend are kept
    /// and sent back on every request, alongside any bearer token.
    pub fn new(base_url: &str) -> DatebookResult<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// A request carrying `token` as a bearer credential.
    pub fn authed(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.request(method, path).bearer_auth(token)
    }
}

/// Unwrap the `data` field of a success response.
pub async fn read_data<T: DeserializeOwned>(resp: Response) -> DatebookResult<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(DatebookError::RequestFailed(status));
    }

    let envelope: Envelope<T> = resp.json().await?;
    Ok(envelope.data)
}

/// The `message` of an error response, if the body has one.
pub async fn error_message(resp: Response) -> Option<String> {
    resp.json::<ErrorBody>().await.ok().and_then(|b| b.message)
}
