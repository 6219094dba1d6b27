// ============================
// vplan-backend-lib/src/auth/session.rs
// ============================
//! Cookie-backed sessions.
//!
//! The cookie carries a random session id only; the identity and expiry
//! live in the store, so logging out removes the session for good.
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;

use super::token_generator::generate_secure_token;
use crate::config::SessionSettings;
use crate::error::AppError;
use crate::metrics::SESSION_CREATED;
use crate::storage::Storage;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "vplan_session";

/// A freshly created session
#[derive(Debug, Clone)]
pub struct Session {
    pub sid: String,
    pub ident: String,
    pub max_age: Duration,
    pub expires_at: DateTime<Utc>,
}

/// Session manager for cookie logins
#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn Storage>,
    default_max_age: Duration,
    remember_max_age: Duration,
    secure: bool,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn Storage>, settings: &SessionSettings) -> Self {
        Self {
            storage,
            default_max_age: Duration::from_secs(settings.default_max_age_secs),
            remember_max_age: Duration::from_secs(settings.remember_max_age_secs),
            secure: settings.secure_cookie,
        }
    }

    /// Create and persist a session for `ident`. `remember` selects the
    /// extended lifetime.
    pub async fn create(&self, ident: &str, remember: bool) -> Result<Session, AppError> {
        let max_age = if remember {
            self.remember_max_age
        } else {
            self.default_max_age
        };
        let ttl = i64::try_from(max_age.as_secs())
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let sid = generate_secure_token();
        self.storage.create_session(&sid, ident, expires_at).await?;
        counter!(SESSION_CREATED).increment(1);

        Ok(Session {
            sid,
            ident: ident.to_string(),
            max_age,
            expires_at,
        })
    }

    /// Identity of a live session, `None` for unknown or expired ids
    pub async fn resolve(&self, sid: &str) -> Result<Option<String>, AppError> {
        match self.storage.get_session(sid).await? {
            Some((ident, expire)) if Utc::now() < expire => Ok(Some(ident)),
            _ => Ok(None),
        }
    }

    /// Forget a session
    pub async fn destroy(&self, sid: &str) -> Result<(), AppError> {
        self.storage.delete_session(sid).await
    }

    /// `Set-Cookie` value for a new session
    pub fn cookie(&self, session: &Session) -> Result<HeaderValue, AppError> {
        let mut value = format!(
            "{SESSION_COOKIE}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            session.sid,
            session.max_age.as_secs()
        );
        if self.secure {
            value.push_str("; Secure");
        }
        HeaderValue::from_str(&value).map_err(|e| AppError::Internal(e.to_string()))
    }
}

/// `Set-Cookie` value that makes the client drop its session cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "vplan_session=deleted; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly",
    )
}

/// Value of cookie `name` from the request headers
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
