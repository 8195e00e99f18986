//! Access token payload decoding.
//!
//! The backend issues JWTs whose payload carries the user's identity. The
//! client never verifies the signature (it has no key); it only reads the
//! claims so the UI knows who is signed in.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DatebookError, DatebookResult};

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The signed-in user, as described by the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    email: String,
    name: String,
    #[serde(default)]
    exp: Option<i64>,
}

/// Claims read from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub user: User,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Decode the payload segment of a JWT into the user it identifies.
pub fn decode(token: &str) -> DatebookResult<DecodedToken> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| DatebookError::TokenDecodeFailed("missing payload segment".into()))?;

    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|e| DatebookError::TokenDecodeFailed(format!("invalid base64: {e}")))?;

    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| DatebookError::TokenDecodeFailed(format!("invalid claims: {e}")))?;

    Ok(DecodedToken {
        user: User {
            id: claims.id,
            email: claims.email,
            name: claims.name,
        },
        expires_at: claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
    })
}

/// User ids come back as strings from some backends and integers from others
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
