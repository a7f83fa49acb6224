use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::auth::Claims;
use crate::config::SecurityConfig;
use crate::limiter::Tier;

/// Authenticated identity produced by credential verification.
/// Never persisted; lives for the duration of one request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub issuer: String,
    pub scopes: HashSet<String>,
    pub expires_at: DateTime<Utc>,
    pub tier: Tier,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable credential was presented at all.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// A credential was presented but failed verification.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

struct RingKey {
    kid: String,
    key: DecodingKey,
}

/// Verifies bearer credentials against a rotatable key ring with an explicit
/// algorithm allow-list. Pure function over credential + key material; no I/O.
pub struct PrincipalResolver {
    keys: Vec<RingKey>,
    validation: Validation,
}

impl PrincipalResolver {
    pub fn from_config(security: &SecurityConfig) -> Result<Self, AuthError> {
        if security.jwt_keys.is_empty() {
            return Err(AuthError::Unauthenticated(
                "no verification keys configured".to_string(),
            ));
        }

        let algorithms: Vec<Algorithm> = security
            .jwt_allowed_algs
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        if algorithms.is_empty() {
            return Err(AuthError::Unauthenticated(
                "no valid algorithms on the allow-list".to_string(),
            ));
        }

        let mut validation = Validation::new(algorithms[0]);
        validation.algorithms = algorithms;
        // Exact expiry semantics; the issuer controls clock skew via `exp`.
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let keys = security
            .jwt_keys
            .iter()
            .map(|k| RingKey {
                kid: k.kid.clone(),
                key: DecodingKey::from_secret(k.secret.as_bytes()),
            })
            .collect();

        Ok(Self { keys, validation })
    }

    /// Verify a raw bearer credential and produce the caller's identity.
    ///
    /// Rejection reasons (bad signature, expiry, off-list algorithm, missing
    /// subject) are preserved in the error for logging; callers map all of
    /// them to one external 401.
    pub fn resolve(&self, raw_credential: &str) -> Result<Identity, AuthError> {
        let header = decode_header(raw_credential)
            .map_err(|e| AuthError::InvalidCredential(format!("malformed token: {}", e)))?;

        // The allow-list check runs before any signature work so an
        // attacker-chosen algorithm never reaches the verifier.
        if !self.validation.algorithms.contains(&header.alg) {
            return Err(AuthError::InvalidCredential(format!(
                "disallowed signing algorithm {:?}",
                header.alg
            )));
        }

        let claims = match header.kid.as_deref() {
            Some(kid) => {
                let ring_key = self
                    .keys
                    .iter()
                    .find(|k| k.kid == kid)
                    .ok_or_else(|| {
                        AuthError::InvalidCredential(format!("unknown key id {:?}", kid))
                    })?;
                self.decode_with(raw_credential, ring_key)?
            }
            // No kid: try every ring entry so rotation does not strand
            // otherwise-valid tokens.
            None => self.decode_any(raw_credential)?,
        };

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::InvalidCredential("missing subject claim".to_string()))?;

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidCredential("unrepresentable expiry".to_string()))?;

        let scopes: HashSet<String> = claims
            .scope
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();

        Ok(Identity {
            subject,
            issuer: claims.iss,
            scopes,
            expires_at,
            tier: Tier::from_claim(claims.tier.as_deref()),
        })
    }

    fn decode_with(&self, token: &str, ring_key: &RingKey) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &ring_key.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))
    }

    fn decode_any(&self, token: &str) -> Result<Claims, AuthError> {
        let mut last_err = AuthError::InvalidCredential("signature mismatch".to_string());
        for ring_key in &self.keys {
            match self.decode_with(token, ring_key) {
                Ok(claims) => return Ok(claims),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtKey;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn security(keys: Vec<JwtKey>) -> SecurityConfig {
        SecurityConfig {
            jwt_keys: keys,
            jwt_allowed_algs: vec!["HS256".to_string()],
            jwt_expiry_hours: 1,
            tenant_secret: "test-tenant-secret".to_string(),
            codec_root_key: String::new(),
            stage_timeout_ms: 1000,
        }
    }

    fn key(kid: &str, secret: &str) -> JwtKey {
        JwtKey {
            kid: kid.to_string(),
            secret: secret.to_string(),
        }
    }

    fn mint(secret: &str, kid: Option<&str>, alg: Algorithm, claims: &Claims) -> String {
        let mut header = Header::new(alg);
        header.kid = kid.map(|s| s.to_string());
        encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims(sub: Option<&str>, exp_offset_secs: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: sub.map(|s| s.to_string()),
            iss: "carrel-test".to_string(),
            scope: "documents:read documents:write".to_string(),
            tier: Some("pro".to_string()),
            exp: now + exp_offset_secs,
            iat: now,
        }
    }

    #[test]
    fn resolves_valid_token() {
        let resolver =
            PrincipalResolver::from_config(&security(vec![key("a", "secret-a")])).unwrap();
        let token = mint("secret-a", Some("a"), Algorithm::HS256, &claims(Some("user-1"), 600));

        let identity = resolver.resolve(&token).unwrap();
        assert_eq!(identity.subject, "user-1");
        assert_eq!(identity.tier, Tier::Pro);
        assert!(identity.scopes.contains("documents:read"));
    }

    #[test]
    fn rejects_expired_token() {
        let resolver =
            PrincipalResolver::from_config(&security(vec![key("a", "secret-a")])).unwrap();
        let token = mint("secret-a", Some("a"), Algorithm::HS256, &claims(Some("user-1"), -600));

        assert!(matches!(
            resolver.resolve(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn rejects_wrong_signature() {
        let resolver =
            PrincipalResolver::from_config(&security(vec![key("a", "secret-a")])).unwrap();
        let token = mint("other-secret", Some("a"), Algorithm::HS256, &claims(Some("u"), 600));

        assert!(matches!(
            resolver.resolve(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn rejects_algorithm_off_allow_list() {
        let resolver =
            PrincipalResolver::from_config(&security(vec![key("a", "secret-a")])).unwrap();
        let token = mint("secret-a", Some("a"), Algorithm::HS384, &claims(Some("u"), 600));

        let err = resolver.resolve(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
        assert!(err.to_string().contains("algorithm"));
    }

    #[test]
    fn rejects_missing_subject() {
        let resolver =
            PrincipalResolver::from_config(&security(vec![key("a", "secret-a")])).unwrap();
        let token = mint("secret-a", Some("a"), Algorithm::HS256, &claims(None, 600));

        assert!(matches!(
            resolver.resolve(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn second_ring_key_verifies_during_rotation() {
        let resolver = PrincipalResolver::from_config(&security(vec![
            key("2025", "new-secret"),
            key("2024", "old-secret"),
        ]))
        .unwrap();

        // Old token signed before rotation, selected by kid.
        let old = mint("old-secret", Some("2024"), Algorithm::HS256, &claims(Some("u"), 600));
        assert!(resolver.resolve(&old).is_ok());

        // Token without kid still verifies against some ring entry.
        let bare = mint("new-secret", None, Algorithm::HS256, &claims(Some("u"), 600));
        assert!(resolver.resolve(&bare).is_ok());
    }

    #[test]
    fn unknown_kid_is_rejected() {
        let resolver =
            PrincipalResolver::from_config(&security(vec![key("a", "secret-a")])).unwrap();
        let token = mint("secret-a", Some("retired"), Algorithm::HS256, &claims(Some("u"), 600));

        assert!(matches!(
            resolver.resolve(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn empty_ring_fails_closed_at_construction() {
        assert!(PrincipalResolver::from_config(&security(vec![])).is_err());
    }
}
