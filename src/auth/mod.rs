pub mod resolver;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config;

/// Wire-format claims carried by a bearer token.
///
/// `sub` is optional at the serde level so a token missing it can be
/// rejected with a precise internal error instead of a deserialization
/// failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub iss: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub tier: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(subject: String, issuer: String, scope: String, tier: Option<String>) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: Some(subject),
            iss: issuer,
            scope,
            tier,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("No signing key configured")]
    NoSigningKey,
}

/// Mint a token against the first key in the configured ring. Development
/// and CLI use only; production credentials come from an external issuer.
pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let keys = &config::config().security.jwt_keys;
    let key = keys.first().ok_or(JwtError::NoSigningKey)?;

    let encoding_key = EncodingKey::from_secret(key.secret.as_bytes());
    let mut header = Header::default();
    header.kid = Some(key.kid.clone());

    encode(&header, claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}
