//! Bearer token minting and verification (HS256).

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

/// Cookies checked, in order, when no `Authorization` header is present.
pub const SESSION_COOKIES: [&str; 2] = ["sb-access-token", "supabase-auth-token"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// The profile's `user_id`.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority").finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn mint(&self, user_id: &str, now: DateTime<Utc>, ttl_secs: u64) -> Result<String> {
        if user_id.trim().is_empty() {
            return Err(MarketError::Validation("user id must be non-empty".into()));
        }
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| MarketError::Config(format!("failed to sign token: {e}")))
    }

    /// Verify signature and expiry and return the subject.
    pub fn verify(&self, token: &str) -> Result<String> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| MarketError::Unauthorized(format!("invalid token: {e}")))?;
        if data.claims.sub.is_empty() {
            return Err(MarketError::Unauthorized("token has an empty subject".into()));
        }
        Ok(data.claims.sub)
    }
}

/// Token from an `Authorization: Bearer` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let token = header?.trim().strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Token from a `Cookie` header value, trying [`SESSION_COOKIES`] in order.
pub fn session_cookie_token(cookie_header: Option<&str>) -> Option<&str> {
    let header = cookie_header?;
    SESSION_COOKIES.iter().find_map(|name| {
        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == *name && !value.is_empty()).then_some(value)
        })
    })
}
