// =============
// crates/backend-lib/src/auth/debug.rs
// =============
//! Auth provider with a single hard-coded account, for development and tests.
use std::collections::HashMap;

use async_trait::async_trait;

use super::provider::{sha256_hex, AuthProvider, AuthResponse};
use crate::error::AppError;

pub const DEBUG_USERNAME: &str = "test";
pub const DEBUG_PASSWORD: &str = "passwd";

/// Accepts `test`/`passwd` only. The identity is the hex SHA-256 of
/// username followed by password; the group is ignored.
pub struct DebugAuthProvider {
    creds: HashMap<String, String>,
}

impl DebugAuthProvider {
    pub fn new() -> Self {
        let creds = HashMap::from([(DEBUG_USERNAME.to_string(), DEBUG_PASSWORD.to_string())]);
        Self { creds }
    }
}

impl Default for DebugAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for DebugAuthProvider {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn authenticate(
        &self,
        username: &str,
        _group: &str,
        password: &str,
    ) -> Result<AuthResponse, AppError> {
        match self.creds.get(username) {
            Some(pw) if pw == password => Ok(AuthResponse {
                ident: sha256_hex(&[username, password]),
                ctx: serde_json::Value::Null,
            }),
            _ => Err(AppError::Unauthorized),
        }
    }
}
