// =============
// crates/backend-lib/src/auth/provider.rs
// =============
//! The `AuthProvider` trait and the value a successful login produces.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{CredentialsProvider, DebugAuthProvider};
use crate::config::{AuthSettings, ProviderKind};
use crate::error::AppError;

/// Result of a successful [`AuthProvider::authenticate`] call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthResponse {
    /// Stable, opaque identity of the principal
    pub ident: String,
    /// Provider-specific payload, `Value::Null` when there is none.
    /// Callers must not assume any particular shape.
    pub ctx: serde_json::Value,
}

/// Validates credentials against some backing source.
///
/// Implementations fail with [`AppError::Unauthorized`] for every kind of
/// mismatch, lookup failures included, so callers cannot tell an unknown
/// user from a wrong password.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn authenticate(
        &self,
        username: &str,
        group: &str,
        password: &str,
    ) -> Result<AuthResponse, AppError>;
}

/// Lowercase hex SHA-256 of the concatenated parts
pub(crate) fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Build the provider selected in the configuration
pub fn build_provider(settings: &AuthSettings) -> anyhow::Result<Arc<dyn AuthProvider>> {
    let provider: Arc<dyn AuthProvider> = match settings.provider {
        ProviderKind::Debug => {
            tracing::warn!("using the debug auth provider, do not run this in production");
            Arc::new(DebugAuthProvider::new())
        },
        ProviderKind::Credentials => Arc::new(CredentialsProvider::new(settings.users.clone())?),
    };
    Ok(provider)
}
