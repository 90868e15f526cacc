//! Caller identity extraction.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE, HeaderName};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::auth::{bearer_token, session_cookie_token};
use crate::http::AppState;
use crate::http::error::ApiError;

/// The authenticated subject of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let token = request_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing bearer token or session cookie"))?;
        let user_id = state.tokens.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected token");
            ApiError::unauthorized("invalid or expired token")
        })?;

        let identity = Self { user_id };
        parts.extensions.insert(identity.clone());
        Ok(identity)
    }
}

/// The `Authorization` header wins over session cookies.
fn request_token(headers: &HeaderMap) -> Option<&str> {
    let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
    bearer_token(header(AUTHORIZATION)).or_else(|| session_cookie_token(header(COOKIE)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sb-access-token=from-cookie"));
        assert_eq!(request_token(&headers), Some("from-cookie"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(request_token(&headers), Some("from-header"));
    }

    #[test]
    fn no_credentials() {
        assert_eq!(request_token(&HeaderMap::new()), None);
    }
}
