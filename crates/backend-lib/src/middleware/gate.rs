// ============================
// crates/backend-lib/src/middleware/gate.rs
// ============================
//! Admission checks run in front of every protected handler: the rate
//! limiter first, then session or bearer-token authentication.
use std::sync::Arc;

use axum::http::{header, HeaderMap};

use super::rate_limit::{Bucket, RateLimiter};
use crate::auth::{parse_cookie, SessionManager, TokenIssuer, SESSION_COOKIE};
use crate::error::AppError;

/// Token presented in the `Authorization` header, with or without the
/// `Bearer` scheme
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value,
    };
    (!token.is_empty()).then(|| token.to_string())
}

pub struct RequestGate {
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionManager>,
    tokens: Arc<TokenIssuer>,
}

impl RequestGate {
    pub fn new(
        limiter: Arc<RateLimiter>,
        sessions: Arc<SessionManager>,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            limiter,
            sessions,
            tokens,
        }
    }

    /// Fail with `RateLimited` once `client` used up its budget in `bucket`
    pub fn admit(&self, bucket: Bucket, client: &str) -> Result<(), AppError> {
        if self.limiter.check(bucket, client) {
            Ok(())
        } else {
            Err(AppError::RateLimited)
        }
    }

    /// Identity behind the request.
    ///
    /// A live session cookie wins; otherwise the bearer token is looked
    /// up. Absence or expiry gives `Unauthorized`, a store fault is
    /// propagated as is.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<String, AppError> {
        if let Some(sid) = parse_cookie(headers, SESSION_COOKIE) {
            if let Some(ident) = self.sessions.resolve(&sid).await? {
                tracing::debug!(ident = %ident, "authorized by session");
                return Ok(ident);
            }
        }

        let Some(token) = bearer_token(headers) else {
            return Err(AppError::Unauthorized);
        };
        match self.tokens.validate(&token).await? {
            Some(ident) => {
                tracing::debug!(ident = %ident, "authorized by api token");
                Ok(ident)
            },
            None => Err(AppError::Unauthorized),
        }
    }

    /// `admit`, then `authorize`
    pub async fn check(
        &self,
        bucket: Bucket,
        client: &str,
        headers: &HeaderMap,
    ) -> Result<String, AppError> {
        self.admit(bucket, client)?;
        self.authorize(headers).await
    }
}
