//! Bearer-token verification and guest identity minting.
//!
//! Token issuance belongs to the external auth service; this module only
//! checks signature and expiry against the shared secret. A connection that
//! presents no usable token is admitted as a guest unless the deployment
//! mandates strict auth.

use jsonwebtoken::{decode, DecodingKey, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by access tokens from the auth service.
/// HS256, `sub` is the user id; `username` falls back to `sub` when absent.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub username: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Resolved identity for a connection. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub is_guest: bool,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token presented")]
    MissingToken,
    #[error("token rejected: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Verify a token's signature and expiry and return the identity it names.
pub fn verify_token(secret: &[u8], token: &str) -> Result<Identity, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;

    let username = data
        .claims
        .username
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| data.claims.sub.clone());

    Ok(Identity {
        user_id: data.claims.sub,
        username,
        is_guest: false,
    })
}

/// Mint a fresh per-connection guest identity.
pub fn guest_identity() -> Identity {
    let suffix: u32 = rand::rng().random();
    Identity {
        user_id: format!("guest-{:08x}", suffix),
        username: format!("Guest-{:08x}", suffix),
        is_guest: true,
    }
}

/// Resolve the identity for a new connection. Missing or invalid tokens
/// downgrade to a guest; strict mode turns both into a rejection.
pub fn resolve_identity(
    secret: &[u8],
    token: Option<&str>,
    strict: bool,
) -> Result<Identity, AuthError> {
    match token {
        Some(token) => match verify_token(secret, token) {
            Ok(identity) => Ok(identity),
            Err(e) if strict => Err(AuthError::InvalidToken(e)),
            Err(e) => {
                tracing::debug!(error = %e, "Token rejected, admitting as guest");
                Ok(guest_identity())
            }
        },
        None if strict => Err(AuthError::MissingToken),
        None => Ok(guest_identity()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret";

    fn make_token(sub: &str, username: Option<&str>, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            username: username.map(str::to_string),
            iat: now,
            exp: now + exp_offset,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    #[test]
    fn valid_token_resolves_authenticated_identity() {
        let token = make_token("u1", Some("alice"), 600);
        let identity = resolve_identity(SECRET, Some(&token), true).unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.username, "alice");
        assert!(!identity.is_guest);
    }

    #[test]
    fn username_falls_back_to_sub() {
        let token = make_token("u2", None, 600);
        let identity = verify_token(SECRET, &token).unwrap();
        assert_eq!(identity.username, "u2");
    }

    #[test]
    fn invalid_token_downgrades_to_guest() {
        let identity = resolve_identity(SECRET, Some("garbage"), false).unwrap();
        assert!(identity.is_guest);
        assert!(identity.user_id.starts_with("guest-"));
    }

    #[test]
    fn expired_token_downgrades_to_guest() {
        let token = make_token("u3", Some("carol"), -600);
        let identity = resolve_identity(SECRET, Some(&token), false).unwrap();
        assert!(identity.is_guest);
    }

    #[test]
    fn strict_mode_rejects_missing_and_invalid_tokens() {
        assert!(matches!(
            resolve_identity(SECRET, None, true),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            resolve_identity(SECRET, Some("garbage"), true),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn guest_identities_are_distinct_per_connection() {
        let a = guest_identity();
        let b = guest_identity();
        assert_ne!(a.user_id, b.user_id);
    }
}
