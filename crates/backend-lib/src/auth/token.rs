// ============================
// crates/backend-lib/src/auth/token.rs
// ============================
//! API token issuance, validation and revocation.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;

use super::token_generator::generate_secure_token;
use crate::error::AppError;
use crate::metrics::TOKEN_ISSUED;
use crate::storage::{is_constraint_violation, Storage};

/// Mints bearer tokens and keeps at most one record per identity
#[derive(Clone)]
pub struct TokenIssuer {
    storage: Arc<dyn Storage>,
    ttl: TimeDelta,
}

impl TokenIssuer {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        let ttl = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self { storage, ttl }
    }

    /// Expiry for a token minted now, truncated to whole seconds
    fn next_expiry(&self) -> DateTime<Utc> {
        let expire = Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        DateTime::from_timestamp(expire.timestamp(), 0).unwrap_or(expire)
    }

    /// Mint a fresh token for `ident`, replacing any previous one.
    ///
    /// The store upserts atomically. Should it still report a uniqueness
    /// violation, another call renewed the record concurrently and one
    /// plain update is attempted; if that fails too the first error wins.
    pub async fn issue_or_renew(&self, ident: &str) -> Result<(String, DateTime<Utc>), AppError> {
        match self.storage.get_user_api_token(ident).await {
            Ok(Some(_)) => tracing::debug!(ident, "renewing api token"),
            Ok(None) => tracing::debug!(ident, "issuing first api token"),
            Err(e) => tracing::warn!(ident, error = %e, "could not look up current api token"),
        }

        let token = generate_secure_token();
        let expire = self.next_expiry();

        if let Err(first) = self.storage.set_user_api_token(ident, &token, expire).await {
            if !is_constraint_violation(&first) {
                return Err(first);
            }
            tracing::debug!(ident, "token upsert collided, retrying as update");
            match self.storage.update_user_api_token(ident, &token, expire).await {
                Ok(true) => {},
                Ok(false) | Err(_) => return Err(first),
            }
        }

        counter!(TOKEN_ISSUED).increment(1);
        Ok((token, expire))
    }

    /// Identity owning `token` if the token exists and has not expired
    pub async fn validate(&self, token: &str) -> Result<Option<String>, AppError> {
        let Some((ident, expire)) = self.storage.get_api_token(token).await? else {
            return Ok(None);
        };
        if Utc::now() < expire {
            Ok(Some(ident))
        } else {
            tracing::debug!(ident = %ident, %expire, "rejecting expired api token");
            Ok(None)
        }
    }

    /// Drop the token record of `ident`
    pub async fn revoke(&self, ident: &str) -> Result<(), AppError> {
        self.storage.delete_user_api_token(ident).await
    }
}
