// ================
// common/src/lib.rs
// ================
//! Wire types shared between the VPlan server and its clients.
//! Everything here is plain serde data; no behavior lives in this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/authenticate/{username}`
///
/// # Fields
/// * `password` - Plain password, must not be empty
/// * `group` - Optional group filter, meaning is provider-specific
/// * `session` - `0` issues a bearer token, `1` opens a cookie session,
///   anything above `1` opens a "remember me" cookie session
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AuthRequest {
    pub password: String,
    pub group: String,
    pub session: i64,
}

impl AuthRequest {
    /// Whether the caller asked for a cookie session instead of a token
    pub fn wants_session(&self) -> bool {
        self.session > 0
    }

    /// Whether the caller asked for the extended session lifetime
    pub fn wants_remember(&self) -> bool {
        self.session > 1
    }
}

/// Response of a successful cookie-session login
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthResponseBody {
    /// Opaque identity of the authenticated principal
    pub ident: String,
    /// Provider-specific context, `null` when the provider has none
    pub ctx: serde_json::Value,
}

/// Response of a successful token login
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenResponseBody {
    #[serde(flatten)]
    pub auth: AuthResponseBody,
    pub token: String,
    pub expire: DateTime<Utc>,
}

/// A timetable for one day
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VPlan {
    pub id: i64,
    pub date_edit: DateTime<Utc>,
    pub date_for: DateTime<Utc>,
    pub block: String,
    pub header: String,
    pub footer: String,
    pub entries: Vec<VPlanEntry>,
}

/// A single substitution line of a [`VPlan`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VPlanEntry {
    pub id: i64,
    pub vplan_id: i64,
    pub class: String,
    pub time: String,
    pub measures: String,
    pub responsible: String,
}

/// Response of `GET /api/vplan`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VPlanResponse {
    pub data: Vec<VPlan>,
}

/// Error envelope returned with every non-2xx response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Inner part of [`ErrorEnvelope`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// HTTP status code
    pub code: u16,
    /// Detail text, blank for authentication and rate-limit failures
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}
